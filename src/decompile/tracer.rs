//! Text output with source line to bytecode offset bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Records, for each bytecode offset, the first source line it was emitted
/// on. Line numbers are relative to the start of the method body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytecodeMappingTracer {
    current_line: usize,
    mapping: BTreeMap<u32, usize>,
}

impl BytecodeMappingTracer {
    pub fn new(start_line: usize) -> Self {
        BytecodeMappingTracer {
            current_line: start_line,
            mapping: BTreeMap::new(),
        }
    }

    pub fn increment_current_line(&mut self) {
        self.current_line += 1;
    }

    pub fn increment_current_lines(&mut self, count: usize) {
        self.current_line += count;
    }

    pub fn decrement_current_line(&mut self) {
        self.current_line = self.current_line.saturating_sub(1);
    }

    pub fn current_line(&self) -> usize {
        self.current_line
    }

    pub fn set_current_line(&mut self, line: usize) {
        self.current_line = line;
    }

    /// Folds the mappings of a tracer used for a detached sub-rendering.
    pub fn merge(&mut self, other: &BytecodeMappingTracer) {
        for (&offset, &line) in &other.mapping {
            self.mapping.entry(offset).or_insert(line);
        }
    }

    pub fn add_mapping(&mut self, offset: u32) {
        self.mapping.entry(offset).or_insert(self.current_line);
    }

    pub fn add_mappings(&mut self, offsets: &BTreeSet<u32>) {
        for &offset in offsets {
            self.add_mapping(offset);
        }
    }

    /// offset -> line
    pub fn mapping(&self) -> &BTreeMap<u32, usize> {
        &self.mapping
    }

    /// line -> offsets, the direction debuggers ask for.
    pub fn lines(&self) -> BTreeMap<usize, Vec<u32>> {
        let mut lines: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
        for (&offset, &line) in &self.mapping {
            lines.entry(line).or_default().push(offset);
        }
        lines
    }
}

/// Growable text buffer used by every `to_java` routine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, s: &str) -> &mut Self {
        self.text.push_str(s);
        self
    }

    pub fn append_buffer(&mut self, other: &TextBuffer) -> &mut Self {
        self.text.push_str(&other.text);
        self
    }

    pub fn append_indent(&mut self, indent: usize, unit: &str) -> &mut Self {
        for _ in 0..indent {
            self.text.push_str(unit);
        }
        self
    }

    pub fn append_line_separator(&mut self) -> &mut Self {
        self.text.push('\n');
        self
    }

    pub fn prepend(&mut self, s: &str) -> &mut Self {
        self.text.insert_str(0, s);
        self
    }

    pub fn enclose(&mut self, left: &str, right: &str) -> &mut Self {
        self.prepend(left);
        self.append(right)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn contains_only_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    /// Drops the first `count` bytes, e.g. a leading indent.
    pub fn skip_start(&mut self, count: usize) -> &mut Self {
        let count = count.min(self.text.len());
        self.text.drain(..count);
        self
    }

    /// Cuts a trailing line separator if there is one.
    pub fn trim_line_separator(&mut self) -> &mut Self {
        if self.text.ends_with('\n') {
            self.text.pop();
        }
        self
    }

    pub fn count_lines(&self) -> usize {
        self.text.matches('\n').count()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for TextBuffer {
    fn from(s: &str) -> Self {
        TextBuffer { text: s.to_string() }
    }
}

impl From<String> for TextBuffer {
    fn from(text: String) -> Self {
        TextBuffer { text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_wins() {
        let mut tracer = BytecodeMappingTracer::new(0);
        tracer.add_mapping(4);
        tracer.increment_current_line();
        tracer.add_mappings(&[4, 7].into_iter().collect());
        assert_eq!(tracer.mapping().get(&4), Some(&0));
        assert_eq!(tracer.mapping().get(&7), Some(&1));
        assert_eq!(tracer.lines().get(&1), Some(&vec![7]));
    }

    #[test]
    fn buffer_counts_lines() {
        let mut buf = TextBuffer::new();
        buf.append_indent(2, "  ").append("x;").append_line_separator();
        buf.enclose("{\n", "}");
        assert_eq!(buf.as_str(), "{\n    x;\n}");
        assert_eq!(buf.count_lines(), 2);
    }
}
