// src/compat/mod.rs

//! Compatibility resolution between a package and the running platform
//!
//! A pure, total function of two version numbers. Both are rounded to one
//! decimal place before comparison; the comparison itself happens in whole
//! tenths so that versions landing on different tenths are never conflated.

/// Three-way compatibility outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    PossiblyIncompatible,
    Incompatible,
}

/// A compatibility outcome plus its human-readable reason
#[derive(Debug, Clone)]
pub struct CompatibilityVerdict {
    pub compatibility: Compatibility,
    pub reason: String,
}

impl CompatibilityVerdict {
    pub fn is_compatible(&self) -> bool {
        self.compatibility == Compatibility::Compatible
    }
}

/// Compare an app's required platform version against the running platform
///
/// A package built for a newer platform than the one running is
/// `Incompatible`; one built for an older platform is only
/// `PossiblyIncompatible` and may be installed after explicit confirmation.
pub fn resolve(app_version: f64, core_version: f64) -> CompatibilityVerdict {
    let app = round_tenths(app_version);
    let core = round_tenths(core_version);

    let (compatibility, reason) = if app > core {
        (
            Compatibility::Incompatible,
            format!(
                "platform version {} < app version {}",
                fmt_tenths(core),
                fmt_tenths(app)
            ),
        )
    } else if app < core {
        (
            Compatibility::PossiblyIncompatible,
            format!(
                "platform version {} > app version {}",
                fmt_tenths(core),
                fmt_tenths(app)
            ),
        )
    } else {
        (
            Compatibility::Compatible,
            format!(
                "platform version {} = app version {}",
                fmt_tenths(core),
                fmt_tenths(app)
            ),
        )
    };

    CompatibilityVerdict {
        compatibility,
        reason,
    }
}

/// Round a version to whole tenths, halves rounding up
fn round_tenths(version: f64) -> i64 {
    (version * 10.0).round() as i64
}

fn fmt_tenths(tenths: i64) -> String {
    format!("{:.1}", tenths as f64 / 10.0)
}
