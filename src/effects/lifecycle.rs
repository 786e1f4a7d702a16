//! Request triplets - the started/done/failed shape of async actions.

use std::fmt;

/// One asynchronous operation's lifecycle, correlated by `params`.
///
/// Every `Started` is answered by exactly one `Done` or `Failed` carrying
/// the same params, unless the store is torn down first.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle<P, R> {
    Started(P),
    Done { params: P, result: R },
    Failed { params: P, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Started,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Started => "started",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<P, R> Lifecycle<P, R> {
    pub fn done(params: P, result: R) -> Self {
        Lifecycle::Done { params, result }
    }

    pub fn failed(params: P, error: impl fmt::Display) -> Self {
        Lifecycle::Failed {
            params,
            error: error.to_string(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Lifecycle::Started(_) => Phase::Started,
            Lifecycle::Done { .. } => Phase::Done,
            Lifecycle::Failed { .. } => Phase::Failed,
        }
    }

    pub fn params(&self) -> &P {
        match self {
            Lifecycle::Started(params)
            | Lifecycle::Done { params, .. }
            | Lifecycle::Failed { params, .. } => params,
        }
    }

    pub fn result(&self) -> Option<&R> {
        match self {
            Lifecycle::Done { result, .. } => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_survive_every_phase() {
        let started: Lifecycle<u32, bool> = Lifecycle::Started(7);
        let done = Lifecycle::done(7, true);
        let failed: Lifecycle<u32, bool> = Lifecycle::failed(7, "nope");
        for l in [&started, &done, &failed] {
            assert_eq!(*l.params(), 7);
        }
        assert_eq!(done.result(), Some(&true));
        assert_eq!(failed.result(), None);
        assert_eq!(failed.phase().to_string(), "failed");
    }
}
