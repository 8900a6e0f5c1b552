//! Stateful line parser for the iostat tabular report.
//!
//! The report has no explicit record separators beyond blank lines, mixes
//! sections of different widths (aggregate CPU stats vs. per-device stats)
//! and marks end-of-interval implicitly with a row labelled `ALL`. The
//! parser is an explicit state struct fed one line at a time; every call to
//! [`ReportParser::step`] returns what happened, so single-line transitions
//! are testable in isolation.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::debug;

use crate::collector::CollectError;
use crate::collector::namespace;

/// Row label that closes an interval, compared case-insensitively.
///
/// This is a textual sentinel coupled to iostat's `-g ALL` group row; the
/// end of an interval is never inferred any other way.
pub const AGGREGATE_ROW: &str = "ALL";

/// Consecutive blank lines tolerated before the parse is considered done.
const BLANK_LINE_TOLERANCE: usize = 5;

/// Where the parser currently is within the report stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// The very first content line is the utility banner; skipped once.
    AwaitingBanner,
    /// The next content line opens a new interval. It is the report's own
    /// timestamp line and carries no stats.
    AwaitingIntervalStart,
    /// Inside an interval, consuming section headers and data rows.
    InSection,
}

/// Outcome of feeding a single line to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep feeding lines.
    Continue,
    /// An aggregate row just closed an interval; keys and values are fresh.
    IntervalComplete,
    /// Blank-line tolerance exceeded; stop feeding, keep what accumulated.
    EndOfReport,
}

/// Line-by-line parser producing an ordered key list and a key → value map.
///
/// Keys are discovered during the first interval and frozen when its
/// aggregate row arrives; every later interval must produce the same number
/// of values and only overwrites the data map. Row ordering is trusted to be
/// stable across intervals — iostat emits sections and devices in a fixed
/// order.
#[derive(Debug)]
pub struct ReportParser {
    phase: Phase,
    blank_lines: usize,

    /// Lowercased label of the active section ("avg-cpu", "device", ...).
    stat_type: String,
    /// Column names of the active section, `/s` rewritten to `_per_sec`.
    stat_names: Vec<String>,

    /// Relative stat paths accumulated for the current interval, in lockstep
    /// with `values` (same index ⇒ same stat).
    stats: Vec<String>,
    values: Vec<String>,

    /// Canonical keys, frozen after the first completed interval.
    keys: Vec<String>,
    /// Latest reading per key; `None` when the value was not numeric.
    data: HashMap<String, Option<f64>>,
    /// Wall-clock capture of the current interval start (unix seconds).
    timestamp: i64,
}

impl ReportParser {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingBanner,
            blank_lines: 0,
            stat_type: String::new(),
            stat_names: Vec::new(),
            stats: Vec::new(),
            values: Vec::new(),
            keys: Vec::new(),
            data: HashMap::new(),
            timestamp: 0,
        }
    }

    /// Consumes a whole report stream.
    ///
    /// Malformed lines are skipped (logged at debug), the blank-line
    /// tolerance ends the parse normally; only the hard format errors abort.
    pub fn parse<R: BufRead>(&mut self, reader: R) -> Result<(), CollectError> {
        for line in reader.lines() {
            let line = line.map_err(CollectError::Io)?;
            if self.step(&line)? == Step::EndOfReport {
                break;
            }
        }
        Ok(())
    }

    /// Feeds one line to the state machine.
    pub fn step(&mut self, line: &str) -> Result<Step, CollectError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            self.blank_lines += 1;
            if self.blank_lines > BLANK_LINE_TOLERANCE {
                debug!("blank line tolerance exceeded, ending report");
                return Ok(Step::EndOfReport);
            }
            return Ok(Step::Continue);
        }
        self.blank_lines = 0;

        match self.phase {
            Phase::AwaitingBanner => {
                self.phase = Phase::AwaitingIntervalStart;
                return Ok(Step::Continue);
            }
            Phase::AwaitingIntervalStart => {
                self.stats.clear();
                self.values.clear();
                self.timestamp = chrono::Utc::now().timestamp();
                self.phase = Phase::InSection;
                return Ok(Step::Continue);
            }
            Phase::InSection => {}
        }

        // Section header: "Device: rrqm/s wrqm/s ...". A lone "label:" token
        // is not a header and falls through to the data-row path.
        if let Some(label) = tokens[0].strip_suffix(':')
            && tokens.len() > 1
        {
            self.stat_type = label.to_ascii_lowercase();
            self.stat_names = tokens[1..].iter().map(|name| per_sec_name(name)).collect();
            return Ok(Step::Continue);
        }

        if self.stat_names.is_empty() || self.stat_type.is_empty() {
            return Err(CollectError::Format(
                "data row before any section header".to_string(),
            ));
        }

        // One extra token means the row carries a sub-entity label (device
        // name). Any other width mismatch cannot be aligned with the header.
        let (sub_entity, row): (Option<&str>, &[&str]) = if tokens.len() > self.stat_names.len() {
            (Some(tokens[0]), &tokens[1..])
        } else {
            (None, &tokens[..])
        };

        if row.len() == self.stat_names.len() {
            for (name, value) in self.stat_names.iter().zip(row) {
                self.stats
                    .push(namespace::build_stat(&self.stat_type, sub_entity, name));
                self.values.push((*value).to_string());
            }
        } else {
            debug!(
                line,
                columns = self.stat_names.len(),
                values = row.len(),
                "dropping misaligned row"
            );
        }

        if sub_entity.is_some_and(|s| s.eq_ignore_ascii_case(AGGREGATE_ROW)) {
            return self.complete_interval();
        }

        Ok(Step::Continue)
    }

    /// Closes the current interval: freezes the key set on first completion
    /// and publishes every accumulated value into the data map.
    fn complete_interval(&mut self) -> Result<Step, CollectError> {
        self.phase = Phase::AwaitingIntervalStart;

        if self.keys.is_empty() {
            if self.stats.is_empty() {
                return Err(CollectError::Format(
                    "no stat names discovered before aggregate row".to_string(),
                ));
            }
            self.keys = self.stats.iter().map(|s| namespace::canonical(s)).collect();
        }

        if self.values.len() != self.keys.len() {
            return Err(CollectError::Format(format!(
                "interval produced {} values for {} keys",
                self.values.len(),
                self.keys.len()
            )));
        }

        for (key, raw) in self.keys.iter().zip(&self.values) {
            let parsed = parse_value(raw);
            if parsed.is_none() {
                debug!(key = %key, value = %raw, "non-numeric metric value");
            }
            self.data.insert(key.clone(), parsed);
        }

        Ok(Step::IntervalComplete)
    }

    /// Ordered canonical keys, empty until the first interval completes.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Latest reading per canonical key.
    pub fn data(&self) -> &HashMap<String, Option<f64>> {
        &self.data
    }

    /// Unix timestamp captured at the start of the latest interval.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether at least one interval has completed.
    pub fn has_interval(&self) -> bool {
        !self.keys.is_empty()
    }
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrites throughput column names: `"rrqm/s"` → `"rrqm_per_sec"`.
/// The `/s` suffix would otherwise collide with the key separator.
fn per_sec_name(name: &str) -> String {
    name.replacen("/s", "_per_sec", 1)
}

/// Coerces a raw report token to a float. Locale-formatted values may use a
/// comma as decimal separator; normalized here, never during tokenization.
fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().replacen(',', ".", 1).parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Linux 3.10.0-229.11.1.el7.x86_64 (gklab-108-166) \t10/26/2015 \t_x86_64_\t(8 CPU)

10/26/2015 06:36:57 AM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           0.50    0.00    0.13    0.00    0.00   99.37

Device:         rrqm/s   wrqm/s     r/s     w/s    rkB/s    wkB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util
sda               0.00     0.00    0.00    0.00     0.01     0.00     8.06     0.00    0.10    0.10    0.00   0.04   0.00
sda1              0.00     0.00    0.00    0.00     0.00     0.00     8.19     0.00    0.12    0.12    0.00   0.12   0.00
sdb               0.02     0.33    0.13    0.64     2.08    15.34    45.70     0.00    1.83    0.94    2.00   0.06   0.00
sdb1              0.00     0.07    0.04    0.08     0.26    10.79   185.22     0.00    9.81    0.23   14.21   0.25   0.00
 ALL              0.05     0.66    0.26    1.27     4.17    30.68    45.65     0.00    1.82    0.92    2.00   0.06   0.00
";

    fn parse(text: &str) -> ReportParser {
        let mut parser = ReportParser::new();
        parser.parse(text.as_bytes()).unwrap();
        parser
    }

    #[test]
    fn full_report_keys_and_values() {
        let parser = parse(REPORT);

        // 6 avg-cpu columns + 5 device rows * 13 columns
        assert_eq!(parser.keys().len(), 6 + 5 * 13);
        assert_eq!(parser.keys().len(), parser.data().len());

        // keys are discovered in section/row order
        assert_eq!(parser.keys()[0], "/intel/linux/iostat/avg-cpu/%user");
        assert_eq!(
            parser.keys()[6],
            "/intel/linux/iostat/device/sda/rrqm_per_sec"
        );

        let data = parser.data();
        assert_eq!(
            data["/intel/linux/iostat/avg-cpu/%idle"],
            Some(99.37)
        );
        assert_eq!(
            data["/intel/linux/iostat/device/ALL/rrqm_per_sec"],
            Some(0.05)
        );
        assert_eq!(
            data["/intel/linux/iostat/device/ALL/wkB_per_sec"],
            Some(30.68)
        );
        assert_eq!(data["/intel/linux/iostat/device/sdb/await"], Some(1.83));
        assert_eq!(
            data["/intel/linux/iostat/device/sdb1/w_await"],
            Some(14.21)
        );
    }

    #[test]
    fn per_sec_suffix_rewrite() {
        assert_eq!(per_sec_name("rrqm/s"), "rrqm_per_sec");
        assert_eq!(per_sec_name("wkB/s"), "wkB_per_sec");
        assert_eq!(per_sec_name("%util"), "%util");
    }

    #[test]
    fn reparsing_is_deterministic() {
        let first = parse(REPORT);
        let second = parse(REPORT);
        assert_eq!(first.keys(), second.keys());
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn second_interval_overwrites_values() {
        let second_interval = "\
10/26/2015 06:36:58 AM
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           1.00    0.00    0.20    0.00    0.00   98.80

Device:         rrqm/s   wrqm/s     r/s     w/s    rkB/s    wkB/s avgrq-sz avgqu-sz   await r_await w_await  svctm  %util
sda               0.10     0.00    0.00    0.00     0.01     0.00     8.06     0.00    0.10    0.10    0.00   0.04   0.00
sda1              0.00     0.00    0.00    0.00     0.00     0.00     8.19     0.00    0.12    0.12    0.00   0.12   0.00
sdb               0.02     0.33    0.13    0.64     2.08    15.34    45.70     0.00    1.83    0.94    2.00   0.06   0.00
sdb1              0.00     0.07    0.04    0.08     0.26    10.79   185.22     0.00    9.81    0.23   14.21   0.25   0.00
 ALL              0.12     0.66    0.26    1.27     4.17    31.00    45.65     0.00    1.82    0.92    2.00   0.06   0.00
";
        let mut text = String::from(REPORT);
        text.push('\n');
        text.push_str(second_interval);

        let parser = parse(&text);
        // key set is frozen after the first interval
        assert_eq!(parser.keys().len(), 6 + 5 * 13);
        let data = parser.data();
        assert_eq!(data["/intel/linux/iostat/avg-cpu/%user"], Some(1.00));
        assert_eq!(
            data["/intel/linux/iostat/device/ALL/wkB_per_sec"],
            Some(31.00)
        );
    }

    #[test]
    fn misaligned_device_row_is_dropped() {
        // sda1 gets one extra value: 15 tokens vs 13 columns + 1 label
        let text = REPORT.replacen("sda1 ", "sda1 1.11 ", 1);
        let parser = parse(&text);

        assert!(
            !parser
                .keys()
                .iter()
                .any(|k| k.contains("device/sda1/")),
            "misaligned row must contribute no keys"
        );
        // the rest of the section is intact
        assert!(parser.keys().iter().any(|k| k.contains("device/sda/")));
        assert_eq!(parser.keys().len(), 6 + 4 * 13);
    }

    #[test]
    fn short_section_is_dropped() {
        // removing one avg-cpu value leaves 5 tokens for 6 columns
        let text = REPORT.replacen("0.13", "", 1);
        let parser = parse(&text);

        assert!(!parser.keys().iter().any(|k| k.contains("avg-cpu")));
        assert!(parser.keys().iter().any(|k| k.contains("device")));
    }

    #[test]
    fn comma_decimal_separator() {
        assert_eq!(parse_value("0,66"), Some(0.66));
        assert_eq!(parse_value("0.66"), Some(0.66));
        assert_eq!(parse_value(" 30.68 "), Some(30.68));
    }

    #[test]
    fn non_numeric_values_are_absent_not_fatal() {
        let text = "\
Linux 3.10.0-229.11.1.el7.x86_64 (gklab-108-166) 10/26/2015 _x86_64_ (8 CPU)

10/26/2015 06:36:57 AM
Device:         rrqm/s   wrqm/s     r/s
sda              err      n/a      0.25
ALL              none     nil      zero
";
        let parser = parse(text);
        let data = parser.data();

        assert_eq!(data["/intel/linux/iostat/device/sda/rrqm_per_sec"], None);
        assert_eq!(data["/intel/linux/iostat/device/sda/wrqm_per_sec"], None);
        // a numeric sibling in the same row still parses
        assert_eq!(data["/intel/linux/iostat/device/sda/r_per_sec"], Some(0.25));
        assert_eq!(data["/intel/linux/iostat/device/ALL/rrqm_per_sec"], None);
    }

    #[test]
    fn blank_line_overflow_ends_parse() {
        let mut parser = ReportParser::new();
        for _ in 0..5 {
            assert_eq!(parser.step("").unwrap(), Step::Continue);
        }
        assert_eq!(parser.step("   ").unwrap(), Step::EndOfReport);
        assert!(parser.keys().is_empty());
    }

    #[test]
    fn non_blank_line_resets_blank_counter() {
        let mut parser = ReportParser::new();
        for _ in 0..5 {
            assert_eq!(parser.step("").unwrap(), Step::Continue);
        }
        // banner line resets the counter
        assert_eq!(parser.step("Linux 4.4 (host)").unwrap(), Step::Continue);
        for _ in 0..5 {
            assert_eq!(parser.step("").unwrap(), Step::Continue);
        }
        assert_eq!(parser.step("").unwrap(), Step::EndOfReport);
    }

    #[test]
    fn data_row_before_header_is_fatal() {
        let text = "\
Linux 3.10.0-229.11.1.el7.x86_64 (gklab-108-166) 10/26/2015 _x86_64_ (8 CPU)

10/26/2015 06:36:57 AM
avg-cpu  %user   %nice %system %iowait  %steal   %idle
           0.50    0.00    0.13    0.00    0.00   99.37
";
        let mut parser = ReportParser::new();
        let err = parser.parse(text.as_bytes()).unwrap_err();
        assert!(matches!(err, CollectError::Format(_)), "{err}");
    }

    #[test]
    fn interval_width_mismatch_is_fatal() {
        // first interval freezes 6 + 13 keys, the second loses a device row
        let first = "\
Linux 3.10.0-229.11.1.el7.x86_64 (gklab-108-166) 10/26/2015 _x86_64_ (8 CPU)

10/26/2015 06:36:57 AM
Device:         rrqm/s   wrqm/s     r/s
sda              0.00     0.00     0.00
ALL              0.05     0.66     0.26

10/26/2015 06:36:58 AM
Device:         rrqm/s   wrqm/s     r/s
ALL              0.05     0.66     0.26
";
        let mut parser = ReportParser::new();
        let err = parser.parse(first.as_bytes()).unwrap_err();
        assert!(matches!(err, CollectError::Format(_)), "{err}");
    }

    #[test]
    fn aggregate_row_label_is_case_insensitive() {
        let text = REPORT.replacen(" ALL ", " all ", 1);
        let parser = parse(&text);
        assert!(parser.has_interval());
        assert_eq!(
            parser.data()["/intel/linux/iostat/device/all/rrqm_per_sec"],
            Some(0.05)
        );
    }

    #[test]
    fn lone_colon_token_is_not_a_header() {
        let mut parser = ReportParser::new();
        parser.step("banner").unwrap();
        parser.step("timestamp line").unwrap();
        // no header yet, so this is a data row and fatal
        assert!(parser.step("Device:").is_err());
    }

    #[test]
    fn timestamp_is_captured_per_interval() {
        let parser = parse(REPORT);
        assert!(parser.timestamp() > 0);
    }
}
