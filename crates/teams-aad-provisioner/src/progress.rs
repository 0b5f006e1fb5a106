/// Receives stage messages for a user-facing progress indicator.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, title: &str);
    fn next(&self, detail: &str);
    fn end(&self, success: bool);
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _title: &str) {}
    fn next(&self, _detail: &str) {}
    fn end(&self, _success: bool) {}
}

/// Writes progress lines to stderr, for the admin CLI.
#[derive(Default)]
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn start(&self, title: &str) {
        eprintln!("{title}");
    }

    fn next(&self, detail: &str) {
        eprintln!("  {detail}");
    }

    fn end(&self, success: bool) {
        eprintln!("  {}", if success { "done" } else { "failed" });
    }
}
