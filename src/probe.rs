use std::io::Write;

use anyhow::Context;
use log::{debug, info, log_enabled, warn, Level};

use crate::region::{Advisory, Region};
use crate::report::{Outcome, Report, Samples, Stage};
use crate::rss;

/// 100 MiB, a multiple of every common page size.
pub const REGION_SIZE: usize = 100 * 1024 * 1024;
pub const FILL_BYTE: u8 = 1;
pub const ADVISORY: Advisory = Advisory::DontNeed;

const REPORT_WRITE: &str = "failed to write report";

pub fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        other => other,
    }
}

/// Runs the measurement sequence once and writes the report to `out`.
///
/// The region is dropped, and so unmapped, on every return path once it has
/// been reserved.
pub fn run<W: Write>(out: W) -> anyhow::Result<Outcome> {
    run_with(out, REGION_SIZE, |_| {})
}

/// `on_reserved` sees the region right after it is mapped, before any page
/// is touched.
fn run_with<W, F>(out: W, size: usize, on_reserved: F) -> anyhow::Result<Outcome>
where
    W: Write,
    F: FnOnce(&Region),
{
    let mut report = Report::new(out, ADVISORY.name());
    report.header(platform_name()).context(REPORT_WRITE)?;
    if rss::is_peak_counter() {
        warn!("{} only reports peak residency, the advisory cannot show up as a drop", platform_name());
    }

    let before_allocation = rss::current_kb()?;
    debug!("baseline rss {} KB", before_allocation);
    report.sample(Stage::BeforeAllocation, before_allocation).context(REPORT_WRITE)?;

    let mut region = Region::reserve(size)?;
    on_reserved(&region);

    let after_allocation = rss::current_kb()?;
    report.sample(Stage::AfterAllocation, after_allocation).context(REPORT_WRITE)?;

    region.touch(FILL_BYTE);

    let after_touch = rss::current_kb()?;
    report.sample(Stage::AfterTouch, after_touch).context(REPORT_WRITE)?;

    region.advise(ADVISORY)?;

    let after_advisory = rss::current_kb()?;
    report.sample(Stage::AfterAdvisory, after_advisory).context(REPORT_WRITE)?;

    if log_enabled!(Level::Debug) {
        // Read only after the last sample, a read may fault the page back in.
        let byte = region.first_byte();
        debug!(
            "first byte after {} is {:#04x} ({})",
            ADVISORY.name(),
            byte,
            if byte == 0 { "zero-filled" } else { "content kept" }
        );
    }

    let samples = Samples {
        before_allocation,
        after_allocation,
        after_touch,
        after_advisory,
    };
    let outcome = Outcome::from(&samples);
    report.results(&outcome).context(REPORT_WRITE)?;
    info!("{:?} -> {:?}", samples, outcome);
    Ok(outcome)
}
