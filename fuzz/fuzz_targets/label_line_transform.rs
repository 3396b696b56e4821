//! Fuzz target for label line classification.
//!
//! This fuzzer feeds arbitrary UTF-8 lines to the line transformer,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelsift::filter::fuzz_transform_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_transform_line(line);
});
