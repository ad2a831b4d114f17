//! A minimal LED service: two actions, one evented state variable.
//!
//! The HTTP transport is stubbed with stdout so the example runs
//! anywhere; a real device would wire `Responder` to its web server
//! and `WebClient` to an outbound HTTP connection.

use bramble_upnp::{
    device_uuid, soap, DataType, Device, Responder, Service, WebClient,
    MIME_XML,
};
use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;
use std::sync::Arc;

struct StdoutResponder;

impl Responder for StdoutResponder {
    fn send(&mut self, status: u16, content_type: &str, body: &str) {
        println!("=> HTTP {status} ({content_type})\n{body}");
    }
}

struct StdoutWebClient;

impl WebClient for StdoutWebClient {
    fn send(
        &mut self,
        callback: &url::Url,
        message: &str,
    ) -> std::io::Result<()> {
        println!("=> NOTIFY to {callback}\n{message}");
        Ok(())
    }
}

const GET_STATE_XML: &str = "<action><name>getState</name>\
<argumentList><argument><name>State</name><direction>out</direction>\
<relatedStateVariable>State</relatedStateVariable></argument>\
</argumentList></action>";

const SET_STATE_XML: &str = "<action><name>setState</name>\
<argumentList><argument><name>State</name><direction>in</direction>\
<relatedStateVariable>State</relatedStateVariable></argument>\
</argumentList></action>";

fn led_service(lit: &Rc<Cell<bool>>) -> Service {
    let mut service = Service::new(
        "led",
        "urn:x-bramble:service:led:1",
        "urn:x-bramble:serviceId:led1",
    );
    service.add_state_variable("State", DataType::String, true);

    let state = Rc::clone(lit);
    service.add_action(
        "getState",
        bramble_upnp::Handler::Closure(Arc::new(
            move |_: &mut Service, r: &mut dyn Responder| {
                let body = format!(
                    "<u:getStateResponse><State>{}</State>\
</u:getStateResponse>",
                    if state.get() { "on" } else { "off" },
                );
                r.send(200, MIME_XML, &soap::envelope(&body));
            },
        )),
        GET_STATE_XML,
    );

    let state = Rc::clone(lit);
    service.add_action(
        "setState",
        bramble_upnp::Handler::Closure(Arc::new(
            move |_: &mut Service, r: &mut dyn Responder| {
                state.set(!state.get());
                r.send(
                    200,
                    MIME_XML,
                    &soap::envelope("<u:setStateResponse/>"),
                );
            },
        )),
        SET_STATE_XML,
    );
    service
}

fn main() {
    let unique = bramble_unique::UniqueId::new(&[0x42; 16]);
    let device = Device {
        friendly_name: "Demo LED".to_string(),
        model_name: "Led".to_string(),
        model_number: "1.0".to_string(),
        model_url: "http://example.com/led".to_string(),
        manufacturer: "Example".to_string(),
        manufacturer_url: "http://example.com".to_string(),
        serial_number: "000042".to_string(),
        presentation_url: "/index.html".to_string(),
        description_path: "/description.xml".to_string(),
        port: 80,
        uuid: device_uuid(&unique),
    };

    let lit = Rc::new(Cell::new(false));
    let mut service = led_service(&lit);

    println!(
        "{}",
        device.description_xml(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            &[&service]
        )
    );
    println!("{}", service.scpd_xml());

    let mut responder = StdoutResponder;
    service.dispatch_control(
        "<s:Body><u:setState xmlns:u=\"urn:x-bramble:service:led:1\">\
</u:setState></s:Body>",
        &mut responder,
    );
    println!("LED is now {}", if lit.get() { "on" } else { "off" });

    let sub = match service.subscribe(
        "http://127.0.0.1:9000/cb",
        "State",
        Some("Second-1800"),
    ) {
        Ok(sub) => sub,
        Err(e) => {
            eprintln!("subscribe failed: {e}");
            return;
        }
    };
    println!("subscribed, sid {}", sub.sid);

    let mut web = StdoutWebClient;
    service.notify("State", &mut web);
    service.unsubscribe(&sub.sid);
}
