//! The hosted device's identity and description document

use crate::service::Service;
use bramble_unique::UniqueId;
use std::fmt::Write;
use std::net::IpAddr;
use uuid::Uuid;

/// Derive the device's stable UUID from its hardware identity
///
/// Called once at startup; the result never changes for a given piece
/// of hardware, so control points see the same device across reboots.
#[must_use]
pub fn device_uuid(unique: &UniqueId) -> Uuid {
    Uuid::from_u128(bramble_unique::uuid(unique, b"upnp-device"))
}

/// Identity attributes of the single hosted device
///
/// Filled in before the protocol engines start and immutable
/// thereafter. Exactly one device per process; its services are owned
/// by the application and passed in wherever a document needs them.
pub struct Device {
    /// Human-readable name shown by control points
    pub friendly_name: String,
    /// Model name, also the first half of the SSDP `SERVER` string
    pub model_name: String,
    /// Model number or version
    pub model_number: String,
    /// Product page URL
    pub model_url: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Manufacturer URL
    pub manufacturer_url: String,
    /// Serial number
    pub serial_number: String,
    /// URL of the device's own web UI, if it has one
    pub presentation_url: String,
    /// Path the description document is served from
    pub description_path: String,
    /// HTTP port the transport listens on
    pub port: u16,
    /// Stable device UUID, from [`device_uuid`]
    pub uuid: Uuid,
}

impl Device {
    /// The model string for SSDP's `SERVER` header
    #[must_use]
    pub fn server_string(&self) -> String {
        format!("{}/{}", self.model_name, self.model_number)
    }

    /// The root description document, served from `description_path`
    ///
    /// `base_ip` is the address this particular request arrived on;
    /// it becomes the `URLBase` all relative URLs resolve against.
    #[must_use]
    pub fn description_xml(
        &self,
        base_ip: IpAddr,
        services: &[&Service],
    ) -> String {
        let mut r = String::from(
            "<?xml version=\"1.0\"?>\
<root xmlns=\"urn:schemas-upnp-org:device-1-0\">\
<specVersion><major>1</major><minor>0</minor></specVersion>",
        );
        let _ = write!(
            r,
            "<URLBase>http://{}:{}/</URLBase>\
<device>\
<deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>\
<friendlyName>{}</friendlyName>\
<presentationURL>{}</presentationURL>\
<serialNumber>{}</serialNumber>\
<modelName>{}</modelName>\
<modelNumber>{}</modelNumber>\
<modelURL>{}</modelURL>\
<manufacturer>{}</manufacturer>\
<manufacturerURL>{}</manufacturerURL>\
<UDN>uuid:{}</UDN>\
<serviceList>",
            base_ip,
            self.port,
            self.friendly_name,
            self.presentation_url,
            self.serial_number,
            self.model_name,
            self.model_number,
            self.model_url,
            self.manufacturer,
            self.manufacturer_url,
            self.uuid,
        );
        for service in services {
            r.push_str(&service.service_fragment_xml());
        }
        r.push_str("</serviceList></device></root>\r\n");
        r
    }
}
