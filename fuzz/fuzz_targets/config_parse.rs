#![no_main]

use kemono_core::config::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = Config::from_toml_str(text) {
        assert!(config.paging.page_size > 0);
        let rendered = config.to_toml_string().expect("valid config renders");
        let reparsed = Config::from_toml_str(&rendered).expect("rendered config parses");
        assert_eq!(reparsed, config);
    }
});
