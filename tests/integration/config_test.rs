//! Configuration integration tests.

use fanout::{Emitter, EmitterConfig, DEFAULT_MAX_LISTENERS};

#[test]
fn test_emitter_from_default_config() {
    let e: Emitter<String, ()> = Emitter::from_config(&EmitterConfig::default());
    assert_eq!(e.max_listeners(), Some(DEFAULT_MAX_LISTENERS));
}

#[test]
fn test_emitter_from_yaml_config() {
    let config = EmitterConfig::from_yaml("max_listeners: 2\nwarn_on_limit: false\n").unwrap();
    let e: Emitter<String, ()> = Emitter::from_config(&config);
    assert_eq!(e.max_listeners(), Some(2));
}

#[test]
fn test_configure_existing_emitter() {
    let e: Emitter<String, ()> = Emitter::new();
    e.configure(&EmitterConfig {
        max_listeners: -1,
        warn_on_limit: true,
    });
    assert_eq!(e.max_listeners(), None);
}
