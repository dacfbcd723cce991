//! Scope resolution
//!
//! The pipeline asks a [`ScopeResolver`] which equipment scope each candidate
//! belongs to. A plain [`Scope`] resolves every candidate to itself, which is
//! what the CLI does with its `--plant/--machine/--data-source` flags.

use crate::collector::CandidateFile;
use crate::error::Result;
use histlake_common::Scope;

pub trait ScopeResolver {
    fn resolve(&self, candidate: &CandidateFile) -> Result<Scope>;
}

impl ScopeResolver for Scope {
    fn resolve(&self, _candidate: &CandidateFile) -> Result<Scope> {
        Ok(self.clone())
    }
}
