//! Deterministic, statistically-unique per-device identifiers
//!
//! Small devices usually carry some built-in unique identifier -- a
//! chip ID burned in at manufacture, or the serial number of the
//! attached SPI flash. Those raw IDs make poor protocol identifiers:
//! they are the wrong size, and they are far from uniformly random
//! (typically encoding batch number and die position, so two devices
//! from the same wafer differ in only a handful of bits).
//!
//! The fix is to hash the raw ID together with a salt naming the
//! purpose the identifier is for. The result is deterministic and
//! stable on any one device for a particular salt, but uncorrelated
//! between devices and between salts. A UPnP device UUID, for
//! instance, is obtained by hashing the chip ID with a "upnp"-flavoured
//! salt; anything else that later needs an ID from the same chip uses
//! a different salt and gets an unrelated value.
#![no_std]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
use core::hash::Hasher;

/// A per-device identity from which purpose-specific IDs are derived
pub struct UniqueId {
    id: [u64; 2],
}

impl UniqueId {
    /// Wrap a raw 128-bit hardware identifier
    ///
    /// The bytes can be a raw chip ID; they are hashed and salted
    /// before any client code sees them.
    pub fn new(unique_bytes: &[u8; 16]) -> Self {
        Self {
            id: [
                u64::from_le_bytes(unique_bytes[0..8].try_into().unwrap()),
                u64::from_le_bytes(unique_bytes[8..16].try_into().unwrap()),
            ],
        }
    }

    /// Return a statistically-unique identifier for a specific purpose
    ///
    /// The `salt` should concisely express the purpose for which the
    /// identifier is needed; identifiers for different purposes must
    /// use different salts.
    pub fn id(&self, salt: &[u8]) -> u64 {
        let mut h =
            siphasher::sip::SipHasher::new_with_keys(self.id[0], self.id[1]);
        h.write(salt);
        h.finish()
    }

    /// Like [`UniqueId::id`] but with a secondary numeric salt
    ///
    /// Useful when an identifier larger than u64 is assembled from
    /// several hashes; see [`uuid`].
    pub fn id2(&self, salt: &[u8], salt2: u32) -> u64 {
        let mut h =
            siphasher::sip::SipHasher::new_with_keys(self.id[0], self.id[1]);
        h.write(salt);
        h.write_u32(salt2);
        h.finish()
    }
}

/// Return a statistically-unique but consistent UUID
///
/// The value is a valid RFC 4122 UUID (version 5, variant 1), stable
/// across restarts on any one device for any one salt.
pub fn uuid(unique: &UniqueId, salt: &[u8]) -> u128 {
    let mut u1 = unique.id2(salt, 0);
    let mut u2 = unique.id2(salt, 1);
    // Variant 1
    u2 |= 0x8000_0000_0000_0000_u64;
    u2 &= !0x4000_0000_0000_0000_u64;
    // Version 5
    u1 &= !0xF000;
    u1 |= 0x5000;

    ((u1 as u128) << 64) | (u2 as u128)
}
