use sentinel_runtime::config::{create_config, resolve_path, CreateConfigParams};
use sentinel_runtime::cursor::{decode_cursor, encode_cursor};

#[test]
fn fresh_config_has_defaults_the_dashboard_reads() {
    let config = create_config(CreateConfigParams {
        name: "dash-test".to_string(),
        genesis_prompt: "Be helpful.".to_string(),
        creator_message: None,
        creator_address: "0x1234".to_string(),
        registered_with_conway: false,
        sandbox_id: "sb-456".to_string(),
        wallet_address: "0xABCD".to_string(),
        api_key: "key-test".to_string(),
        parent_address: None,
    });

    // The dashboard's /api/overview route surfaces these fields directly.
    assert_eq!(config.name, "dash-test");
    assert!(!config.inference_model.is_empty());
    assert!(!config.db_path.is_empty());
}

#[test]
fn resolve_path_expands_tilde_for_db_and_skills_paths() {
    let resolved = resolve_path("~/.automaton/state.db");
    assert!(!resolved.starts_with('~'));
    assert!(resolved.ends_with(".automaton/state.db"));
}

#[test]
fn cursor_round_trips_across_pages() {
    let page_one_end = encode_cursor("2026-08-01T10:00:00Z", "turn-42");
    let (timestamp, id) = decode_cursor(&page_one_end).expect("cursor decodes");
    assert_eq!(timestamp, "2026-08-01T10:00:00Z");
    assert_eq!(id, "turn-42");
}

#[test]
fn malformed_cursor_is_rejected_not_panicked_on() {
    assert!(decode_cursor("%%%not-a-cursor%%%").is_none());
}
