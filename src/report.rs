use std::borrow::Cow;
use std::io::{self, Write};

/// Point in the probe sequence at which residency is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BeforeAllocation,
    AfterAllocation,
    AfterTouch,
    AfterAdvisory,
}

/// The four residency samples of one run, in kilobytes, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Samples {
    pub before_allocation: u64,
    pub after_allocation: u64,
    pub after_touch: u64,
    pub after_advisory: u64,
}

/// Whether the advisory showed up in the residency accounting right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `after_touch - after_advisory`. Zero or negative means the advisory had
    /// no observable effect, which is a valid result.
    pub reduction_kb: i64,
    pub immediate: bool,
}

impl From<&Samples> for Outcome {
    fn from(samples: &Samples) -> Self {
        Self {
            reduction_kb: samples.after_touch as i64 - samples.after_advisory as i64,
            immediate: samples.after_advisory < samples.after_touch,
        }
    }
}

/// Line-oriented text report. Lines are written as soon as each sample is
/// taken so a failed run still shows how far it got.
pub struct Report<W> {
    out: W,
    advisory: &'static str,
}

impl<W: Write> Report<W> {
    pub fn new(out: W, advisory: &'static str) -> Self {
        Self { out, advisory }
    }

    pub fn header(&mut self, platform: &str) -> io::Result<()> {
        writeln!(self.out, "Testing {} on {}", self.advisory, platform)?;
        writeln!(self.out, "{}", "=".repeat(30))
    }

    pub fn sample(&mut self, stage: Stage, kb: u64) -> io::Result<()> {
        let label: Cow<'static, str> = match stage {
            Stage::BeforeAllocation => "before allocation".into(),
            Stage::AfterAllocation => "after allocation".into(),
            Stage::AfterTouch => "after touching pages".into(),
            Stage::AfterAdvisory => format!("after {}", self.advisory).into(),
        };
        writeln!(self.out, "RSS {}: {} KB", label, kb)
    }

    pub fn results(&mut self, outcome: &Outcome) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Results:")?;
        writeln!(self.out, "RSS reduction: {} KB", outcome.reduction_kb)?;
        writeln!(
            self.out,
            "Immediate reduction: {}",
            if outcome.immediate { "YES" } else { "NO" }
        )?;
        self.out.flush()
    }
}
