//! In-memory skip/take emulation for backends without native paging.
//!
//! The emulator is planned once per compiled query from the backend's
//! capabilities. Every call binds it against its own arguments, producing a
//! [`PageWindow`]: a skip gate followed by a take gate, applied to the rows in
//! that order. Each gate keeps its own counter, so rows dropped by the skip
//! gate never count against the take.

use serde::Deserialize;
use sluice_common::config::ExecutionSettings;
use sluice_error::Result;

use crate::binder::CountResolver;
use crate::plan::SubQuery;
use crate::value::CallArgs;

/// What a backend can do natively.
pub trait PagingCapabilities: Send + Sync {
    fn supports_skip(&self, query: &SubQuery) -> bool;

    fn supports_take(&self, query: &SubQuery) -> bool;
}

/// Static capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderFlags {
    #[serde(default)]
    pub skip_supported: bool,
    #[serde(default)]
    pub take_supported: bool,
}

impl ProviderFlags {
    /// Backend handles both skip and take.
    pub fn native() -> Self {
        Self {
            skip_supported: true,
            take_supported: true,
        }
    }

    /// Backend handles neither; everything is emulated.
    pub fn emulated() -> Self {
        Self::default()
    }

    /// Applies the `emulate_*` overrides from configuration.
    pub fn with_settings(self, settings: &ExecutionSettings) -> Self {
        Self {
            skip_supported: self.skip_supported && !settings.emulate_skip,
            take_supported: self.take_supported && !settings.emulate_take,
        }
    }
}

impl PagingCapabilities for ProviderFlags {
    fn supports_skip(&self, _query: &SubQuery) -> bool {
        self.skip_supported
    }

    fn supports_take(&self, _query: &SubQuery) -> bool {
        self.take_supported
    }
}

/// Skip/take resolvers installed for one compiled query.
#[derive(Debug, Clone, Default)]
pub struct PagingEmulator {
    skip: Option<CountResolver>,
    take: Option<CountResolver>,
}

impl PagingEmulator {
    pub fn plan(query: &SubQuery, capabilities: &dyn PagingCapabilities) -> Result<Self> {
        let select = query.select();

        let skip = match &select.skip {
            Some(limit) if !capabilities.supports_skip(query) => {
                CountResolver::for_limit(limit, query)?
            }
            _ => None,
        };

        let take = match &select.take {
            Some(limit) if !capabilities.supports_take(query) => {
                CountResolver::for_limit(limit, query)?
            }
            _ => None,
        };

        Ok(Self { skip, take })
    }

    pub fn skip(&self) -> Option<&CountResolver> {
        self.skip.as_ref()
    }

    pub fn take(&self) -> Option<&CountResolver> {
        self.take.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// Resolves both counts against one call's arguments.
    pub fn bind(&self, args: &CallArgs) -> Result<PageWindow> {
        Ok(PageWindow {
            skip: self
                .skip
                .as_ref()
                .map(|r| r.resolve(args).map(SkipGate::new))
                .transpose()?,
            take: self
                .take
                .as_ref()
                .map(|r| r.resolve(args).map(TakeGate::new))
                .transpose()?,
        })
    }
}

/// Verdict of a gate on the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Consume the row without producing a result.
    Drop,
    /// Map and deliver the row.
    Pass,
    /// No further rows are wanted.
    Exhausted,
}

/// Drops a fixed number of leading rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipGate {
    remaining: usize,
}

impl SkipGate {
    pub fn new(count: usize) -> Self {
        Self { remaining: count }
    }

    pub fn admit(&mut self) -> Admission {
        if self.remaining > 0 {
            self.remaining -= 1;
            Admission::Drop
        } else {
            Admission::Pass
        }
    }
}

/// Passes a fixed number of rows, then reports exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeGate {
    remaining: usize,
}

impl TakeGate {
    pub fn new(count: usize) -> Self {
        Self { remaining: count }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn admit(&mut self) -> Admission {
        if self.remaining == 0 {
            Admission::Exhausted
        } else {
            self.remaining -= 1;
            Admission::Pass
        }
    }
}

/// The bound paging state of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    skip: Option<SkipGate>,
    take: Option<TakeGate>,
}

impl PageWindow {
    /// A window that admits every row.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(skip: Option<usize>, take: Option<usize>) -> Self {
        Self {
            skip: skip.map(SkipGate::new),
            take: take.map(TakeGate::new),
        }
    }

    pub fn has_skip(&self) -> bool {
        self.skip.is_some()
    }

    pub fn has_take(&self) -> bool {
        self.take.is_some()
    }

    /// True once the take gate will refuse every further row. Drivers check
    /// this before reading so no row is fetched past the window.
    pub fn is_exhausted(&self) -> bool {
        self.take.is_some_and(|t| t.is_exhausted())
    }

    /// Runs the next row through skip, then take.
    pub fn admit(&mut self) -> Admission {
        if self.is_exhausted() {
            return Admission::Exhausted;
        }
        if let Some(skip) = &mut self.skip {
            if skip.admit() == Admission::Drop {
                return Admission::Drop;
            }
        }
        match &mut self.take {
            Some(take) => take.admit(),
            None => Admission::Pass,
        }
    }
}
