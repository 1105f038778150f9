//! Compilation report (spec §4 ambient diagnostics): an opt-in, at-exit
//! summary of how a batch of methods compiled — how many took the VM path
//! vs. the state-machine path, how many were skipped by the enum/switch-map
//! policy, and how many hit a fatal label error. Gated by a single env var
//! so it costs nothing when unset, the same shape as `resolver.rs`'s
//! `SEQ_STDLIB` check rather than a tracing framework.

use std::fmt;
use std::fs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilationReport {
    pub vm_path: u32,
    pub state_machine_path: u32,
    pub skipped: u32,
    pub label_errors: u32,
}

impl CompilationReport {
    pub fn new() -> Self {
        CompilationReport::default()
    }

    pub fn record_compiled(&mut self, used_vm_path: bool) {
        if used_vm_path {
            self.vm_path += 1;
        } else {
            self.state_machine_path += 1;
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_label_error(&mut self) {
        self.label_errors += 1;
    }

    pub fn total(&self) -> u32 {
        self.vm_path + self.state_machine_path + self.skipped
    }

    fn to_json(&self) -> String {
        format!(
            "{{\"vm_path\":{},\"state_machine_path\":{},\"skipped\":{},\"label_errors\":{},\"total\":{}}}",
            self.vm_path, self.state_machine_path, self.skipped, self.label_errors, self.total()
        )
    }
}

impl fmt::Display for CompilationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nv-compiler: compiled {} method(s)", self.total())?;
        writeln!(f, "  vm path:           {}", self.vm_path)?;
        writeln!(f, "  state machine path: {}", self.state_machine_path)?;
        writeln!(f, "  skipped:           {}", self.skipped)?;
        if self.label_errors > 0 {
            writeln!(f, "  label errors:      {}", self.label_errors)?;
        }
        Ok(())
    }
}

/// Where (and whether) `NV_COMPILE_REPORT` asks the report to go.
enum ReportSink {
    StderrText,
    StderrJson,
    File(String),
}

fn configured_sink(raw: &str) -> Option<ReportSink> {
    match raw {
        "" | "0" => None,
        "1" => Some(ReportSink::StderrText),
        "json" => Some(ReportSink::StderrJson),
        other => other
            .strip_prefix("json:")
            .map(|path| ReportSink::File(path.to_string())),
    }
}

/// Read `NV_COMPILE_REPORT` and, if set to a recognized form, print or
/// write the report. Unset, empty, or `"0"` emits nothing.
pub fn emit(report: &CompilationReport) {
    let Ok(raw) = std::env::var("NV_COMPILE_REPORT") else {
        return;
    };
    match configured_sink(&raw) {
        Some(ReportSink::StderrText) => eprint!("{}", report),
        Some(ReportSink::StderrJson) => eprintln!("{}", report.to_json()),
        Some(ReportSink::File(path)) => {
            if let Err(e) = fs::write(&path, report.to_json()) {
                eprintln!("nv-compiler: failed to write compile report to {path}: {e}");
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_exclude_label_errors() {
        let mut report = CompilationReport::new();
        report.record_compiled(true);
        report.record_compiled(false);
        report.record_skipped();
        report.record_label_error();
        assert_eq!(report.total(), 3);
        assert_eq!(report.label_errors, 1);
    }

    #[test]
    fn unset_and_zero_disable_the_sink() {
        assert!(configured_sink("").is_none());
        assert!(configured_sink("0").is_none());
    }

    #[test]
    fn one_selects_stderr_text() {
        assert!(matches!(configured_sink("1"), Some(ReportSink::StderrText)));
    }

    #[test]
    fn json_prefix_selects_a_file_sink() {
        match configured_sink("json:/tmp/report.json") {
            Some(ReportSink::File(path)) => assert_eq!(path, "/tmp/report.json"),
            _ => panic!("expected a file sink"),
        }
    }

    #[test]
    fn display_mentions_every_counted_path() {
        let mut report = CompilationReport::new();
        report.record_compiled(true);
        report.record_compiled(false);
        report.record_skipped();
        let text = report.to_string();
        assert!(text.contains("vm path"));
        assert!(text.contains("state machine path"));
        assert!(text.contains("skipped"));
    }
}
