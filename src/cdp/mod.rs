//! Hand-written CDP domain types for the handful of methods the bootstrap
//! and printing protocols use.
//!
//! This crate doesn't implement the DevTools protocol beyond what those two
//! protocols need, so rather than generating a full protocol surface from
//! upstream PDL files at build time, this module declares just the domains
//! in play (`browser_protocol::{target,page,network,security,inspector}`,
//! `js_protocol` omitted — unused) by hand, sized to exactly what the
//! canonical printing protocol and the bootstrap protocol call.

pub mod browser_protocol {
    pub mod target;
    pub mod page;
    pub mod network;
    pub mod security;
    pub mod inspector;
}

pub use browser_protocol::{inspector, network, page, security, target};
