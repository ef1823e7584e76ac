//! `Inspector` domain: the one event a Protocol's awaits have to recognize
//! and log without treating it as terminal.

pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";
