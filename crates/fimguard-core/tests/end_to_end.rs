//! End-to-end tests: raw model output in, clean deduplicated completion out

use fimguard_core::prelude::*;
use futures::stream;

const RAW_COMPLETION: &str =
    "<|fim_middle|>function foo() {\n  return 1;\n}\nfunction foo() {\n  return 1;\n}\n<|endoftext|>extra";

#[test]
fn test_clean_then_detect() {
    let codec = TemplateCodec::default();
    let cleaned = codec.clean_output(RAW_COMPLETION);
    assert_eq!(cleaned, "function foo() {\n  return 1;\n}\nfunction foo() {\n  return 1;\n}\n");

    let detector = DuplicationDetector::new(DetectorConfig::default()).unwrap();
    let report = detector.detect_duplicates(&cleaned, Some("javascript"));

    assert!(report.has_duplicates);
    assert_eq!(report.duplicate_blocks.len(), 1);
    let group = &report.duplicate_blocks[0];
    assert_eq!(group.kind, DuplicateKind::Exact);
    assert_eq!(group.occurrences, 2);
    assert_eq!((group.start_line, group.end_line), (0, 2));
    assert!(report.duplicates_removed >= 1);
    assert_eq!(report.cleaned_code.matches("function foo()").count(), 1);
    assert_eq!(report.original_line_count, 6);
    assert_eq!(report.cleaned_line_count, 3);
}

#[test]
fn test_pipeline_finalize_matches_manual_steps() {
    let pipeline = CompletionPipeline::new(PipelineConfig::default()).unwrap();
    let output = pipeline.finalize(RAW_COMPLETION, Some("javascript"));
    assert_eq!(output.text, "function foo() {\n  return 1;\n}\n");
    assert_eq!(output.report.duplicates_removed, 1);
}

#[test]
fn test_report_serializes_to_json() {
    let pipeline = CompletionPipeline::default();
    let output = pipeline.finalize(RAW_COMPLETION, Some("javascript"));
    let json = serde_json::to_value(&output.report).unwrap();
    assert_eq!(json["has_duplicates"], true);
    assert_eq!(json["duplicate_blocks"][0]["kind"], "exact");
    assert_eq!(json["duplicate_blocks"][0]["locations"][1]["start_line"], 3);
}

#[tokio::test]
async fn test_streamed_generation_stops_at_end_of_text() {
    let pipeline = CompletionPipeline::default();
    let tokens = [
        "function ",
        "foo() {\n",
        "  return 1;\n",
        "}\n",
        "function foo() {\n",
        "  return 1;\n",
        "}\n",
        "<|endoftext|>",
        "extra tokens the model kept producing",
    ];
    let stream = stream::iter(tokens.iter().map(|t| Ok::<_, std::io::Error>(*t)));
    let output = pipeline.generate(stream, Some("javascript")).await.unwrap();

    assert_eq!(output.finish_reason, Some(FinishReason::StopSequence));
    assert_eq!(output.stats.map(|s| s.tokens), Some(8));
    assert_eq!(output.text, "function foo() {\n  return 1;\n}\n");
    assert!(output.request_id.is_some());
}

#[test]
fn test_python_completion_with_comments() {
    let raw = "<|fim_middle|>def area(r):\n    # circle\n    return 3.14 * r * r\n\ndef area(r):\n    return 3.14 * r * r  # again\n<|endoftext|>";
    let pipeline = CompletionPipeline::default();
    let output = pipeline.finalize(raw, Some("python"));
    assert_eq!(output.report.duplicate_blocks[0].kind, DuplicateKind::Exact);
    assert_eq!(output.text, "def area(r):\n    # circle\n    return 3.14 * r * r\n");
}
