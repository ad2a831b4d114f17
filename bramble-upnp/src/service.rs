//! Services, their action tables, and control dispatch

use crate::eventing::{Subscriber, SubscriberKey};
use crate::soap;
use slotmap::SlotMap;
use std::sync::Arc;

/// XML content type for control and description responses
pub const MIME_XML: &str = "text/xml; charset=\"utf-8\"";

/// The transport's side of a control exchange
///
/// The HTTP server routing `/{service}/control` hands dispatch a
/// responder; whichever handler runs uses it to send its own SOAP
/// response. Dispatch itself never sends anything, in particular not
/// for requests it discards.
pub trait Responder {
    /// Send one complete HTTP response
    fn send(&mut self, status: u16, content_type: &str, body: &str);
}

/// Plain-function action handler
pub type ActionFn = fn(&mut Service, &mut dyn Responder);

/// The callable registered for an action
///
/// Either a plain function or a captured closure; both are invoked
/// with the owning service so handlers can reach its state variables
/// and subscribers.
#[derive(Clone)]
pub enum Handler {
    /// A free function
    Function(ActionFn),
    /// A closure, typically one that has captured application state
    Closure(Arc<dyn Fn(&mut Service, &mut dyn Responder)>),
}

impl From<ActionFn> for Handler {
    fn from(f: ActionFn) -> Self {
        Self::Function(f)
    }
}

/// One remotely-invocable action
pub struct Action {
    /// Action name as it appears in the SOAP call tag
    pub name: String,
    /// What to run when a control point invokes the action
    pub handler: Handler,
    /// `<action>` fragment for the SCPD document
    pub descriptor_xml: String,
}

/// Data types a state variable can declare
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// `string`
    String,
    /// `boolean`
    Boolean,
    /// `ui4`
    Ui4,
}

impl DataType {
    const fn as_xml(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Ui4 => "ui4",
        }
    }
}

/// One named, subscribable state variable
///
/// The variable's value lives with the sensor or actuator code that
/// owns it; the service tracks only the name, for subscription
/// matching and for the SCPD document.
pub struct StateVariable {
    /// Variable name
    pub name: String,
    /// Declared data type
    pub data_type: DataType,
    /// Whether changes are pushed to subscribers
    pub send_events: bool,
}

/// A named service on the hosted device
///
/// Owns the action table, the state-variable table, and the subscriber
/// table. All three are mutated only from the single-threaded main
/// loop; the tables need no locking.
pub struct Service {
    /// Service name, also its URL namespace `/{name}/...`
    pub name: String,
    /// Service type URN
    pub service_type: String,
    /// Service id URN
    pub service_id: String,
    actions: Vec<Action>,
    variables: Vec<StateVariable>,
    pub(crate) subscribers: SlotMap<SubscriberKey, Subscriber>,
}

impl Service {
    /// Create an empty service
    #[must_use]
    pub fn new(name: &str, service_type: &str, service_id: &str) -> Self {
        Self {
            name: name.to_string(),
            service_type: service_type.to_string(),
            service_id: service_id.to_string(),
            actions: Vec::new(),
            variables: Vec::new(),
            subscribers: SlotMap::with_key(),
        }
    }

    /// Register an action
    ///
    /// The table is append-only. Nothing rejects a second action whose
    /// name differs only in case; dispatch finds the first match, so
    /// the earlier registration wins.
    pub fn add_action(
        &mut self,
        name: &str,
        handler: impl Into<Handler>,
        descriptor_xml: &str,
    ) {
        self.actions.push(Action {
            name: name.to_string(),
            handler: handler.into(),
            descriptor_xml: descriptor_xml.to_string(),
        });
    }

    /// Register a state variable
    pub fn add_state_variable(
        &mut self,
        name: &str,
        data_type: DataType,
        send_events: bool,
    ) {
        self.variables.push(StateVariable {
            name: name.to_string(),
            data_type,
            send_events,
        });
    }

    /// Look up a registered variable by name, case-insensitively
    #[must_use]
    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.variables
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Dispatch one inbound control request
    ///
    /// Extracts the SOAP action name from `body`, looks it up
    /// case-insensitively, and runs the handler, which sends its own
    /// response through `responder`. Every failure branch (no
    /// envelope, malformed call tag, unknown action) drops the request
    /// without invoking anything and without replying.
    pub fn dispatch_control(
        &mut self,
        body: &str,
        responder: &mut dyn Responder,
    ) {
        let Some(name) = soap::action_name(body) else {
            tracing::debug!(service = %self.name, "control body discarded");
            return;
        };
        let Some(action) = self
            .actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        else {
            tracing::debug!(service = %self.name, name, "unknown action");
            return;
        };
        // Clone the callable out of the table so the handler can
        // borrow the whole service mutably.
        let handler = action.handler.clone();
        tracing::trace!(service = %self.name, name, "dispatch");
        match handler {
            Handler::Function(f) => f(self, responder),
            Handler::Closure(c) => c(self, responder),
        }
    }

    /// The service's entry for the device's `serviceList`
    #[must_use]
    pub fn service_fragment_xml(&self) -> String {
        format!(
            "<service>\
<serviceType>{}</serviceType>\
<serviceId>{}</serviceId>\
<controlURL>/{}/control</controlURL>\
<eventSubURL>/{}/event</eventSubURL>\
<SCPDURL>/{}/scpd.xml</SCPDURL>\
</service>",
            self.service_type,
            self.service_id,
            self.name,
            self.name,
            self.name,
        )
    }

    /// The service's SCPD document, served from `/{name}/scpd.xml`
    #[must_use]
    pub fn scpd_xml(&self) -> String {
        let mut r = String::from(
            "<?xml version=\"1.0\"?>\
<scpd xmlns=\"urn:schemas-upnp-org:service-1-0\">\
<specVersion><major>1</major><minor>0</minor></specVersion>\
<ActionList>\r\n",
        );
        for action in &self.actions {
            r.push_str(&action.descriptor_xml);
        }
        r.push_str("</ActionList>\r\n<serviceStateTable>\r\n");
        for v in &self.variables {
            if v.send_events {
                r.push_str("<stateVariable sendEvents=\"yes\">");
            } else {
                r.push_str("<stateVariable sendEvents=\"no\">");
            }
            r.push_str("<name>");
            r.push_str(&v.name);
            r.push_str("</name><dataType>");
            r.push_str(v.data_type.as_xml());
            r.push_str("</dataType></stateVariable>");
        }
        r.push_str("</serviceStateTable>\r\n</scpd>\r\n");
        r
    }
}
