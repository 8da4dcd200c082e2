// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use lilith_mitm::core::correlation::{classify, extract_id, extract_method};

fuzz_target!(|data: &[u8]| {
    // The classification helpers are total functions: any JSON document,
    // however weird, must classify (or not) without crashing.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = classify(&value);
        let _ = extract_id(&value);
        let _ = extract_method(&value);
    }
});
