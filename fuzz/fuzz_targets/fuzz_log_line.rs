//! Fuzz target for hop and timeout line parsing.

#![no_main]

use hoptrace::correlator::{HopEvent, TimeoutEvent};
use hoptrace::ids::NodeRef;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let origin = NodeRef::new("fuzz");
    let _ = HopEvent::parse_line(line, &origin);
    let _ = TimeoutEvent::parse_line(line, &origin);
});
