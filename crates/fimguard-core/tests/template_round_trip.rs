//! Prompt/cleanup round trips for every registered template

use fimguard_core::prelude::*;
use std::sync::Arc;

const PREFIX: &str = "def add(a, b):\n    ";
const SUFFIX: &str = "\n\nprint(add(1, 2))";
const MIDDLE: &str = "return a + b";
const GARBAGE: &str = "\n# trailing garbage the model kept writing";

#[test]
fn test_round_trip_for_every_template() {
    let registry = Arc::new(TemplateRegistry::builtin());
    for id in registry.ids() {
        let codec = TemplateCodec::with_template(Arc::clone(&registry), &id, None);
        let eot = codec
            .template()
            .eot
            .clone()
            .unwrap_or_else(|| "<|endoftext|>".to_string());

        let raw = format!("{}{}{}{}", codec.build_prompt(PREFIX, SUFFIX), MIDDLE, eot, GARBAGE);
        let cleaned = codec.clean_output(&raw);

        assert!(cleaned.contains(MIDDLE), "[{id}] lost middle: {cleaned:?}");
        assert!(!cleaned.contains("garbage"), "[{id}] kept tail: {cleaned:?}");
        assert!(!codec.contains_control_token(&cleaned), "[{id}] residual tokens: {cleaned:?}");
        for token in codec.template().tokens() {
            assert!(!cleaned.contains(token.trim()), "[{id}] residual {token:?}");
        }
    }
}

#[test]
fn test_whitespace_variants_are_stripped() {
    let codec = TemplateCodec::default();
    let variants = [
        "< | fim_prefix | >x",
        "<|fim_prefix |>x",
        "<| fim_prefix|>x",
        "<|FIM_PREFIX|>x",
        "<|fim_prefix>x",
    ];
    for variant in variants {
        assert_eq!(codec.clean_output(variant), "x", "variant {variant:?}");
    }
}

#[test]
fn test_brace_framed_custom_tokens() {
    let mut codec = TemplateCodec::default();
    let custom = CustomTokens {
        prefix: Some("{|begin|}".to_string()),
        suffix: Some("{|hole|}".to_string()),
        middle: Some("{|end|}".to_string()),
        eot: Some("{|stop|}".to_string()),
        ..Default::default()
    };
    codec.select_template("custom", Some(&custom));
    assert_eq!(codec.build_prompt("a", "b"), "{|begin|}a{|hole|}b{|end|}");
    assert_eq!(codec.clean_output("{ | end | }let x = 1;{ |stop| }tail"), "let x = 1;");
}

#[test]
fn test_generic_markers_truncate_for_any_template() {
    let registry = Arc::new(TemplateRegistry::builtin());
    let codec = TemplateCodec::with_template(registry, "codellama", None);
    assert_eq!(codec.clean_output("<MID>x = 1<|im_end|>junk"), "x = 1");
}

#[test]
fn test_unknown_template_falls_back() {
    let registry = Arc::new(TemplateRegistry::builtin());
    let codec = TemplateCodec::with_template(registry, "not-a-model", None);
    assert_eq!(codec.template().id, "default");
}

#[test]
fn test_code_with_pipes_and_braces_survives() {
    let codec = TemplateCodec::default();
    let code = "if (a || b) {}\nlet f = |x| x + 1;";
    assert_eq!(codec.clean_output(code), code);

    for code in [
        "if (flag || eot || done) { go(); }",
        "let m = a || fim_pad || b;",
        "x = y |im_end| z",
    ] {
        assert_eq!(codec.clean_output(code), code);
    }
}
