//! Event subscriptions and change notification
//!
//! Control points SUBSCRIBE to a service's `/{name}/event` URL naming
//! a callback URL and the state variables they care about. When the
//! application reports a variable change, every live subscriber
//! watching that variable gets one NOTIFY request, delivered through
//! the caller-supplied [`WebClient`]. Delivery is fire-and-forget: a
//! subscriber that has gone away just stops receiving, it is never
//! retried and never auto-unsubscribed.

use crate::service::Service;
use std::fmt::Write;
use url::Url;
use uuid::Uuid;

slotmap::new_key_type! {
    /// Stable handle into a service's subscriber table
    pub struct SubscriberKey;
}

/// One live event subscription
pub struct Subscriber {
    pub(crate) callback: Url,
    pub(crate) sid: Uuid,
    pub(crate) seq: u32,
    /// Registered spellings of the watched variable names
    pub(crate) watched: Vec<String>,
    /// Requested lifetime, stored verbatim; expiry is not enforced
    #[allow(dead_code)]
    pub(crate) timeout: Option<String>,
}

/// What a successful subscribe reports back to the control point
///
/// `accepted_statevars` is the comma-joined list of requested variable
/// names that actually resolved against the service; it goes out in
/// the `ACCEPTED-STATEVAR` response header.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscribeResponse {
    /// The new subscription's identifier, unique among live ones
    pub sid: Uuid,
    /// Comma-joined accepted variable names
    pub accepted_statevars: String,
}

/// Why a subscribe request was rejected
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// The `CALLBACK` header did not hold a parseable URL
    #[error("malformed callback URL")]
    BadCallback(#[from] url::ParseError),
}

/// Outbound HTTP, as much of it as NOTIFY delivery needs
pub trait WebClient {
    /// Deliver one NOTIFY request to a subscriber's callback URL
    ///
    /// # Errors
    ///
    /// Implementations report connect/send failures; the caller logs
    /// and forgets them.
    fn send(
        &mut self,
        callback: &Url,
        message: &str,
    ) -> std::io::Result<()>;
}

fn property_set(variable: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\r\n\
<e:propertyset xmlns:e=\"urn:schemas-upnp-org:event-1-0\">\r\n\
<e:property>\r\n\
<variableName>{variable}</variableName>\r\n\
</e:property>\r\n\
</e:propertyset>\r\n"
    )
}

fn notify_message(subscriber: &Subscriber, variable: &str) -> String {
    let body = property_set(variable);
    let path = subscriber.callback.path();
    let host = subscriber.callback.host_str().unwrap_or("");
    let port = subscriber.callback.port_or_known_default().unwrap_or(80);
    let mut msg = String::new();
    let _ = write!(
        msg,
        "NOTIFY {path} HTTP/1.0\r\n\
HOST: {host}:{port}\r\n\
CONTENT-TYPE: text/xml; charset=\"utf-8\"\r\n\
NT: upnp:event\r\n\
NTS: upnp:propchange\r\n\
SID: uuid:{sid}\r\n\
SEQ: {seq}\r\n\
Content-Length: {len}\r\n\
\r\n\
{body}",
        sid = subscriber.sid,
        seq = subscriber.seq,
        len = body.len(),
    );
    msg
}

impl Service {
    /// Accept a subscription
    ///
    /// `statevar_list` is the control point's comma/whitespace
    /// separated list of variable names; names that do not resolve
    /// against this service's table are dropped without complaint, and
    /// only the survivors (in their registered spelling) are echoed
    /// back. An empty accepted list is still a valid subscription, it
    /// just never receives anything.
    ///
    /// # Errors
    ///
    /// Rejects the subscribe if `callback` is not a parseable URL;
    /// existing subscriptions are unaffected.
    pub fn subscribe(
        &mut self,
        callback: &str,
        statevar_list: &str,
        timeout: Option<&str>,
    ) -> Result<SubscribeResponse, SubscribeError> {
        let callback = Url::parse(callback)?;
        let watched: Vec<String> = statevar_list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty())
            .filter_map(|name| {
                self.state_variable(name).map(|v| v.name.clone())
            })
            .collect();

        let mut sid = Uuid::new_v4();
        while self.subscribers.values().any(|s| s.sid == sid) {
            sid = Uuid::new_v4();
        }

        let accepted_statevars = watched.join(",");
        tracing::debug!(
            service = %self.name,
            %sid,
            %callback,
            accepted = %accepted_statevars,
            "subscribe"
        );
        self.subscribers.insert(Subscriber {
            callback,
            sid,
            seq: 1,
            watched,
            timeout: timeout.map(str::to_string),
        });
        Ok(SubscribeResponse {
            sid,
            accepted_statevars,
        })
    }

    /// Drop the subscription with this SID
    ///
    /// The slot becomes immediately reusable. An unknown SID is a
    /// no-op, matching how control points re-send unsubscribes.
    pub fn unsubscribe(&mut self, sid: &Uuid) {
        let key = self
            .subscribers
            .iter()
            .find(|(_, s)| s.sid == *sid)
            .map(|(k, _)| k);
        if let Some(key) = key {
            tracing::debug!(service = %self.name, %sid, "unsubscribe");
            self.subscribers.remove(key);
        } else {
            tracing::debug!(service = %self.name, %sid, "unknown sid");
        }
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Tell subscribers that `variable` changed
    ///
    /// One NOTIFY per live subscriber watching that name; each carries
    /// that subscriber's SID and its next SEQ value. Delivery failures
    /// are logged and otherwise ignored.
    pub fn notify(&mut self, variable: &str, client: &mut dyn WebClient) {
        for subscriber in self.subscribers.values_mut() {
            if !subscriber
                .watched
                .iter()
                .any(|w| w.eq_ignore_ascii_case(variable))
            {
                continue;
            }
            let message = notify_message(subscriber, variable);
            if let Err(e) =
                client.send(&subscriber.callback, &message)
            {
                tracing::debug!(
                    sid = %subscriber.sid,
                    error = %e,
                    "notify delivery failed"
                );
            }
            subscriber.seq = subscriber.seq.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DataType;

    struct FakeWebClient {
        sent: Vec<(Url, String)>,
        fail: bool,
    }

    impl FakeWebClient {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                fail: false,
            }
        }
    }

    impl WebClient for FakeWebClient {
        fn send(
            &mut self,
            callback: &Url,
            message: &str,
        ) -> std::io::Result<()> {
            if self.fail {
                return Err(
                    std::io::ErrorKind::ConnectionRefused.into()
                );
            }
            self.sent.push((callback.clone(), message.to_string()));
            Ok(())
        }
    }

    fn service() -> Service {
        let mut s = Service::new(
            "weather",
            "urn:x-bramble:service:weather:1",
            "urn:x-bramble:serviceId:weather1",
        );
        s.add_state_variable("Temperature", DataType::String, true);
        s.add_state_variable("Pressure", DataType::String, true);
        s
    }

    const CB: &str = "http://192.168.1.99:8080/events";

    #[test]
    fn unknown_names_are_dropped_from_accepted_list() {
        let mut s = service();
        let r = s.subscribe(CB, "Temperature, Bogus", None).unwrap();
        assert_eq!(r.accepted_statevars, "Temperature");
        assert_eq!(s.subscriber_count(), 1);
    }

    #[test]
    fn accepted_list_echoes_registered_spelling() {
        let mut s = service();
        let r = s.subscribe(CB, "temperature,PRESSURE", None).unwrap();
        assert_eq!(r.accepted_statevars, "Temperature,Pressure");
    }

    #[test]
    fn bad_callback_rejects_without_side_effects() {
        let mut s = service();
        assert!(matches!(
            s.subscribe("not a url", "Temperature", None),
            Err(SubscribeError::BadCallback(_))
        ));
        assert_eq!(s.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_watching_subscriber() {
        let mut s = service();
        let r = s.subscribe(CB, "Pressure", None).unwrap();
        let mut wc = FakeWebClient::new();
        s.notify("Pressure", &mut wc);
        assert_eq!(wc.sent.len(), 1);
        let (url, msg) = &wc.sent[0];
        assert_eq!(url.as_str(), CB);
        assert!(msg.starts_with("NOTIFY /events HTTP/1.0\r\n"));
        assert!(msg.contains("HOST: 192.168.1.99:8080\r\n"));
        assert!(msg.contains("NT: upnp:event\r\n"));
        assert!(msg.contains("NTS: upnp:propchange\r\n"));
        assert!(msg.contains(&format!("SID: uuid:{}\r\n", r.sid)));
        assert!(msg.contains("SEQ: 1\r\n"));
        assert!(
            msg.contains("<variableName>Pressure</variableName>")
        );
    }

    #[test]
    fn notify_skips_non_watching_subscriber() {
        let mut s = service();
        s.subscribe(CB, "Temperature", None).unwrap();
        let mut wc = FakeWebClient::new();
        s.notify("Pressure", &mut wc);
        assert!(wc.sent.is_empty());
    }

    #[test]
    fn empty_watch_list_receives_nothing() {
        let mut s = service();
        let r = s.subscribe(CB, "", None).unwrap();
        assert_eq!(r.accepted_statevars, "");
        let mut wc = FakeWebClient::new();
        s.notify("Temperature", &mut wc);
        s.notify("Pressure", &mut wc);
        assert!(wc.sent.is_empty());
        assert_eq!(s.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribed_subscriber_is_never_notified() {
        let mut s = service();
        let r = s.subscribe(CB, "Temperature", None).unwrap();
        s.unsubscribe(&r.sid);
        assert_eq!(s.subscriber_count(), 0);
        let mut wc = FakeWebClient::new();
        s.notify("Temperature", &mut wc);
        assert!(wc.sent.is_empty());
    }

    #[test]
    fn unsubscribe_of_unknown_sid_is_a_no_op() {
        let mut s = service();
        s.subscribe(CB, "Temperature", None).unwrap();
        s.unsubscribe(&Uuid::new_v4());
        assert_eq!(s.subscriber_count(), 1);
    }

    #[test]
    fn reused_slot_gets_a_fresh_sid() {
        let mut s = service();
        let first = s.subscribe(CB, "Temperature", None).unwrap();
        s.unsubscribe(&first.sid);
        let second = s.subscribe(CB, "Temperature", None).unwrap();
        assert_ne!(first.sid, second.sid);
        assert_eq!(s.subscriber_count(), 1);
    }

    #[test]
    fn seq_counters_are_independent_per_subscriber() {
        let mut s = service();
        let a = s
            .subscribe("http://10.0.0.1/ev", "Temperature", None)
            .unwrap();
        let mut wc = FakeWebClient::new();
        s.notify("Temperature", &mut wc);
        s.notify("Temperature", &mut wc);

        let b = s
            .subscribe("http://10.0.0.2/ev", "Temperature", None)
            .unwrap();
        wc.sent.clear();
        s.notify("Temperature", &mut wc);

        let seq_of = |sid: &Uuid| {
            let tag = format!("SID: uuid:{sid}\r\n");
            wc.sent
                .iter()
                .find(|(_, m)| m.contains(&tag))
                .and_then(|(_, m)| {
                    m.lines()
                        .find(|l| l.starts_with("SEQ: "))
                        .and_then(|l| l[5..].trim().parse::<u32>().ok())
                })
                .unwrap()
        };
        assert_eq!(seq_of(&a.sid), 3);
        assert_eq!(seq_of(&b.sid), 1);
    }

    #[test]
    fn delivery_failure_is_swallowed_and_seq_still_advances() {
        let mut s = service();
        s.subscribe(CB, "Temperature", None).unwrap();
        let mut wc = FakeWebClient::new();
        wc.fail = true;
        s.notify("Temperature", &mut wc);
        wc.fail = false;
        s.notify("Temperature", &mut wc);
        assert_eq!(wc.sent.len(), 1);
        assert!(wc.sent[0].1.contains("SEQ: 2\r\n"));
    }

    #[test]
    fn timeout_is_stored_but_never_expires_anyone() {
        let mut s = service();
        s.subscribe(CB, "Temperature", Some("Second-1800"))
            .unwrap();
        assert_eq!(s.subscriber_count(), 1);
        let mut wc = FakeWebClient::new();
        s.notify("Temperature", &mut wc);
        assert_eq!(wc.sent.len(), 1);
    }
}
