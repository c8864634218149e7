//! Chart protocol encoder with minimal allocations.

use bytes::{BufMut, BytesMut};
use std::time::Duration;

/// Fields of a `CHART` command.
///
/// Borrowed so that the chart model can describe itself without cloning.
#[derive(Debug, Clone, Copy)]
pub struct ChartDefinition<'a> {
    /// Chart type part of the fully-qualified id (`type.id`)
    pub type_id: &'a str,
    pub id: &'a str,
    /// Optional display name override, usually empty
    pub name: &'a str,
    pub title: &'a str,
    pub units: &'a str,
    pub family: &'a str,
    pub context: &'a str,
    /// Rendering type (line, area, stacked, heatmap)
    pub chart_type: &'a str,
    pub priority: i64,
    /// Data collection frequency in seconds
    pub update_every: u64,
    /// Space separated chart options (obsolete, detail, store_first, hidden)
    pub options: &'a str,
    pub plugin: &'a str,
    pub module: &'a str,
}

/// Fields of a `DIMENSION` command.
#[derive(Debug, Clone, Copy)]
pub struct DimensionDefinition<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub algorithm: &'a str,
    /// Zero is emitted as 1
    pub multiplier: i64,
    /// Zero is emitted as 1
    pub divisor: i64,
    /// Space separated dimension options (obsolete, hidden, noreset, nooverflow)
    pub options: &'a str,
}

/// Writer for the line-oriented chart protocol.
///
/// Commands accumulate in a reusable buffer. Nothing here touches the real
/// output; the owner hands [`ProtocolWriter::buffer`] to an
/// [`OutputSink`](crate::OutputSink) and then calls [`ProtocolWriter::clear`].
pub struct ProtocolWriter {
    buffer: BytesMut,
}

impl ProtocolWriter {
    /// Create a new protocol writer with default capacity (4KB)
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Create a new protocol writer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Write a CHART command
    pub fn chart(&mut self, def: &ChartDefinition<'_>) {
        self.buffer.put_slice(b"CHART '");
        self.buffer.put_slice(def.type_id.as_bytes());
        self.buffer.put_u8(b'.');
        self.buffer.put_slice(def.id.as_bytes());
        self.buffer.put_slice(b"' ");
        self.write_quoted(def.name);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.title);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.units);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.family);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.context);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.chart_type);
        self.buffer.put_slice(b" '");
        self.write_i64(def.priority);
        self.buffer.put_slice(b"' '");
        self.write_u64(def.update_every);
        self.buffer.put_slice(b"' ");
        self.write_quoted(def.options);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.plugin);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.module);
        self.buffer.put_u8(b'\n');
    }

    /// Write a CLABEL command
    pub fn clabel(&mut self, key: &str, value: &str, source: u8) {
        self.buffer.put_slice(b"CLABEL ");
        self.write_quoted(key);
        self.buffer.put_u8(b' ');
        self.write_quoted(value);
        self.buffer.put_slice(b" '");
        self.write_u64(u64::from(source));
        self.buffer.put_slice(b"'\n");
    }

    /// Write a CLABEL_COMMIT command
    pub fn clabel_commit(&mut self) {
        self.buffer.put_slice(b"CLABEL_COMMIT\n");
    }

    /// Write a DIMENSION command
    pub fn dimension(&mut self, def: &DimensionDefinition<'_>) {
        self.buffer.put_slice(b"DIMENSION ");
        self.write_quoted(def.id);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.name);
        self.buffer.put_u8(b' ');
        self.write_quoted(def.algorithm);
        self.buffer.put_slice(b" '");
        self.write_i64(non_zero(def.multiplier));
        self.buffer.put_slice(b"' '");
        self.write_i64(non_zero(def.divisor));
        self.buffer.put_slice(b"' ");
        self.write_quoted(def.options);
        self.buffer.put_u8(b'\n');
    }

    /// Write a chart-scoped VARIABLE command
    pub fn variable(&mut self, id: &str, value: i64) {
        self.buffer.put_slice(b"VARIABLE CHART ");
        self.write_quoted(id);
        self.buffer.put_slice(b" = ");
        self.write_i64(value);
        self.buffer.put_u8(b'\n');
    }

    /// Begin a chart update (BEGIN command)
    ///
    /// `since_last` is the time elapsed since the previous update of this
    /// chart; `Duration::ZERO` lets the receiver use the chart's own
    /// collection frequency.
    pub fn begin(&mut self, type_id: &str, id: &str, since_last: Duration) {
        self.buffer.put_slice(b"BEGIN '");
        self.buffer.put_slice(type_id.as_bytes());
        self.buffer.put_u8(b'.');
        self.buffer.put_slice(id.as_bytes());
        self.buffer.put_slice(b"' ");
        // microseconds
        self.write_u64(since_last.as_micros() as u64);
        self.buffer.put_u8(b'\n');
    }

    /// Write a dimension value (SET command)
    pub fn set(&mut self, id: &str, value: i64) {
        self.buffer.put_slice(b"SET ");
        self.write_quoted(id);
        self.buffer.put_slice(b" = ");
        self.write_i64(value);
        self.buffer.put_u8(b'\n');
    }

    /// Mark a dimension as having no value this cycle (SET without a value)
    pub fn set_empty(&mut self, id: &str) {
        self.buffer.put_slice(b"SET ");
        self.write_quoted(id);
        self.buffer.put_slice(b" = \n");
    }

    /// End a chart update (END command followed by an empty line)
    pub fn end(&mut self) {
        self.buffer.put_slice(b"END\n\n");
    }

    /// Terminate a chart definition block
    pub fn empty_line(&mut self) {
        self.buffer.put_u8(b'\n');
    }

    /// Write a single-quoted field.
    ///
    /// The protocol has no escape mechanism, so literal single quotes are
    /// replaced with double quotes.
    fn write_quoted(&mut self, value: &str) {
        self.buffer.put_u8(b'\'');
        if value.contains('\'') {
            for b in value.bytes() {
                self.buffer.put_u8(if b == b'\'' { b'"' } else { b });
            }
        } else {
            self.buffer.put_slice(value.as_bytes());
        }
        self.buffer.put_u8(b'\'');
    }

    /// Write an i64 value using itoa (zero-allocation integer formatting)
    #[inline]
    fn write_i64(&mut self, value: i64) {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.buffer.put_slice(s.as_bytes());
    }

    /// Write a u64 value using itoa (zero-allocation integer formatting)
    #[inline]
    fn write_u64(&mut self, value: u64) {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.buffer.put_slice(s.as_bytes());
    }

    /// Get the current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get a reference to the accumulated output
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Clear the buffer, keeping its capacity
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ProtocolWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn non_zero(v: i64) -> i64 {
    if v == 0 { 1 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(writer: &ProtocolWriter) -> String {
        String::from_utf8_lossy(writer.buffer()).into_owned()
    }

    #[test]
    fn test_write_chart_definition() {
        let mut writer = ProtocolWriter::new();
        writer.chart(&ChartDefinition {
            type_id: "mysql_local",
            id: "queries",
            name: "",
            title: "Queries",
            units: "queries/s",
            family: "queries",
            context: "mysql.queries",
            chart_type: "line",
            priority: 70000,
            update_every: 1,
            options: "",
            plugin: "go.d",
            module: "mysql",
        });
        writer.dimension(&DimensionDefinition {
            id: "queries",
            name: "queries",
            algorithm: "incremental",
            multiplier: 1,
            divisor: 0,
            options: "",
        });
        writer.empty_line();

        assert_eq!(
            output(&writer),
            "CHART 'mysql_local.queries' '' 'Queries' 'queries/s' 'queries' 'mysql.queries' 'line' '70000' '1' '' 'go.d' 'mysql'\n\
             DIMENSION 'queries' 'queries' 'incremental' '1' '1' ''\n\
             \n"
        );
    }

    #[test]
    fn test_write_chart_update() {
        let mut writer = ProtocolWriter::new();

        writer.begin("job", "cpu", Duration::from_secs(1));
        writer.set("user", 42);
        writer.set_empty("system");
        writer.variable("cores", 8);
        writer.end();

        assert_eq!(
            output(&writer),
            "BEGIN 'job.cpu' 1000000\nSET 'user' = 42\nSET 'system' = \nVARIABLE CHART 'cores' = 8\nEND\n\n"
        );
    }

    #[test]
    fn test_begin_without_previous_update() {
        let mut writer = ProtocolWriter::new();
        writer.begin("job", "cpu", Duration::ZERO);
        assert_eq!(output(&writer), "BEGIN 'job.cpu' 0\n");
    }

    #[test]
    fn test_labels() {
        let mut writer = ProtocolWriter::new();
        writer.clabel("instance", "db'1", 1);
        writer.clabel_commit();
        assert_eq!(
            output(&writer),
            "CLABEL 'instance' 'db\"1' '1'\nCLABEL_COMMIT\n"
        );
    }

    #[test]
    fn test_negative_values_and_zero_multiplier() {
        let mut writer = ProtocolWriter::new();
        writer.set("delta", -15);
        writer.dimension(&DimensionDefinition {
            id: "out",
            name: "out",
            algorithm: "absolute",
            multiplier: 0,
            divisor: 1000,
            options: "hidden",
        });
        assert_eq!(
            output(&writer),
            "SET 'delta' = -15\nDIMENSION 'out' 'out' 'absolute' '1' '1000' 'hidden'\n"
        );
    }

    #[test]
    fn test_reusable_buffer() {
        let mut writer = ProtocolWriter::new();

        writer.begin("job", "chart", Duration::from_secs(1));
        writer.set("value", 1);
        writer.end();
        let len1 = writer.len();
        writer.clear();
        assert!(writer.is_empty());

        writer.begin("job", "chart", Duration::from_secs(1));
        writer.set("value", 2);
        writer.end();
        assert_eq!(len1, writer.len());
    }
}
