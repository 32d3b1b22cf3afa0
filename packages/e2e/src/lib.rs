//! NFT Omnibridge E2E scenarios
//!
//! Runs bridge scenarios against a live Home/Foreign chain pair through the
//! `amb-relay` core: relays in both directions, manual relay with validator
//! signatures, failed message fixes and mediator balance fixes.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

pub mod config;
pub mod env;
pub mod scenarios;

pub use config::E2eConfig;
pub use env::{SideEnv, TestEnv};
pub use scenarios::{all_scenarios, run_scenarios, Scenario};

/// Represents the outcome of a single scenario
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestResult {
    Pass {
        name: String,
        #[serde(rename = "duration_ms", serialize_with = "as_millis")]
        duration: Duration,
    },
    Fail {
        name: String,
        error: String,
        #[serde(rename = "duration_ms", serialize_with = "as_millis")]
        duration: Duration,
    },
    Skip {
        name: String,
        reason: String,
    },
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl TestResult {
    /// Create a new pass result
    pub fn pass(name: impl Into<String>, duration: Duration) -> Self {
        Self::Pass {
            name: name.into(),
            duration,
        }
    }

    /// Create a new fail result
    pub fn fail(name: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self::Fail {
            name: name.into(),
            error: error.into(),
            duration,
        }
    }

    /// Create a new skip result
    pub fn skip(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Skip {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Pass { name, .. } => name,
            Self::Fail { name, .. } => name,
            Self::Skip { name, .. } => name,
        }
    }

    /// Short label used by the run summary
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass { .. } => "OK",
            Self::Fail { .. } => "FAILED",
            Self::Skip { .. } => "SKIPPED",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { name, duration } => {
                write!(
                    f,
                    "\x1b[32mPASS\x1b[0m: {} ({:.2}ms)",
                    name,
                    duration.as_millis()
                )
            }
            Self::Fail {
                name,
                error,
                duration,
            } => {
                write!(
                    f,
                    "\x1b[31mFAIL\x1b[0m: {} - {}\n    ({:.2}ms)",
                    name,
                    error,
                    duration.as_millis()
                )
            }
            Self::Skip { name, reason } => {
                write!(f, "\x1b[33mSKIP\x1b[0m: {} - {}", name, reason)
            }
        }
    }
}

/// Aggregates scenario results and provides summary
#[derive(Debug, Clone)]
pub struct TestSuite {
    name: String,
    results: Vec<TestResult>,
    start_time: Instant,
}

/// JSON form of a finished suite
#[derive(Debug, Serialize)]
pub struct SuiteReport<'a> {
    pub name: &'a str,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,
    pub results: &'a [TestResult],
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn add_result(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_fail()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.is_pass() && !r.is_fail())
            .count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.is_pass())
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Process exit code: the number of failed scenarios, capped at 255
    pub fn exit_code(&self) -> i32 {
        self.failed().min(255) as i32
    }

    pub fn report(&self) -> SuiteReport<'_> {
        SuiteReport {
            name: &self.name,
            total: self.total(),
            passed: self.passed(),
            failed: self.failed(),
            skipped: self.skipped(),
            elapsed_ms: self.elapsed().as_millis() as u64,
            results: &self.results,
        }
    }

    /// Print a summary of the results
    pub fn print_summary(&self) {
        println!();
        println!("Tests summary:");
        for (i, result) in self.results.iter().enumerate() {
            println!("{}) {} - {}", i + 1, result.name(), result.label());
        }

        println!();
        println!("Test Suite: {}", self.name);
        println!("----------------------------------------");
        println!("Total:   {}", self.total());
        println!("Passed:  \x1b[32m{}\x1b[0m", self.passed());
        println!("Failed:  \x1b[31m{}\x1b[0m", self.failed());
        println!("Skipped: \x1b[33m{}\x1b[0m", self.skipped());
        println!("Elapsed: {:.2}ms", self.elapsed().as_millis());
        println!("----------------------------------------");

        if self.failed() > 0 {
            println!("\nFailed scenarios:");
            for result in &self.results {
                if result.is_fail() {
                    println!("  {}", result);
                }
            }
        }
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TestSuite({} - {} passed, {} failed)",
            self.name,
            self.passed(),
            self.failed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite() -> TestSuite {
        let mut suite = TestSuite::new("NFT Omnibridge E2E");
        suite.add_result(TestResult::pass("a", Duration::from_millis(12)));
        suite.add_result(TestResult::fail("b", "boom", Duration::from_millis(3)));
        suite.add_result(TestResult::skip("c", "no owner"));
        suite
    }

    #[test]
    fn test_suite_counts() {
        let suite = suite();
        assert_eq!(suite.total(), 3);
        assert_eq!(suite.passed(), 1);
        assert_eq!(suite.failed(), 1);
        assert_eq!(suite.skipped(), 1);
        assert!(!suite.all_passed());
        assert_eq!(suite.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_is_capped() {
        let mut suite = TestSuite::new("many");
        for i in 0..300 {
            suite.add_result(TestResult::fail(format!("s{}", i), "x", Duration::ZERO));
        }
        assert_eq!(suite.exit_code(), 255);
    }

    #[test]
    fn test_labels() {
        let suite = suite();
        let labels: Vec<_> = suite.results().iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["OK", "FAILED", "SKIPPED"]);
    }

    #[test]
    fn test_report_json() {
        let suite = suite();
        let json = serde_json::to_value(suite.report()).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["status"], "pass");
        assert_eq!(json["results"][0]["duration_ms"], 12);
        assert_eq!(json["results"][1]["error"], "boom");
        assert_eq!(json["results"][2]["reason"], "no owner");
    }
}
