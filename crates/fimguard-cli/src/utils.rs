//! Utility functions for the fimguard CLI

use anyhow::{Context, Result};
use console::style;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read a whole file, or stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

/// Split text into pieces of at most `size` characters, the way a model
/// runtime would hand over tokens
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

/// Format milliseconds in human-readable form
pub fn format_millis(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.0}µs", ms * 1000.0)
    }
}

/// Print formatted output (JSON or human-readable)
pub fn print_output(data: &Value, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        print_human_readable(data);
    }
    Ok(())
}

fn print_human_readable(data: &Value) {
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Array(arr) => {
                        println!("{}:", style(key).bold());
                        for (i, item) in arr.iter().enumerate() {
                            println!("  {}: {}", i + 1, format_value(item));
                        }
                    }
                    Value::Object(_) => {
                        println!("{}:", style(key).bold());
                        print_nested_object(value, 1);
                    }
                    _ => println!("{}: {}", style(key).bold(), format_value(value)),
                }
            }
        }
        _ => println!("{}", format_value(data)),
    }
}

fn print_nested_object(data: &Value, indent: usize) {
    let prefix = "  ".repeat(indent);

    if let Value::Object(map) = data {
        for (key, value) in map {
            match value {
                Value::Object(_) => {
                    println!("{}{}:", prefix, style(key).bold());
                    print_nested_object(value, indent + 1);
                }
                _ => println!("{}{}: {}", prefix, style(key).bold(), format_value(value)),
            }
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", style(title).cyan().bold());
}

/// Print warning with styling
pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_text() {
        assert_eq!(chunk_text("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk_text("héllo", 2), vec!["hé", "ll", "o"]);
        assert_eq!(chunk_text("ab", 0), vec!["a", "b"]);
        assert!(chunk_text("", 4).is_empty());
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0.5), "500µs");
        assert_eq!(format_millis(12.34), "12.3ms");
        assert_eq!(format_millis(2500.0), "2.50s");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("text")), "text");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&Value::Null), "null");
        assert_eq!(format_value(&json!([1, 2])), "[1,2]");
    }
}
