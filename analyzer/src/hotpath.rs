// hotpath.rs — Hot-path oracle
//
// Classifies functions as latency-critical. A function is hot iff it carries
// the `faultline_hot` annotation attribute, its qualified name matches a
// configured function glob, or its defining file matches a configured file
// glob. Decisions are memoized by function identity.
//
// A second population pass (marking callees of known-hot entries) is allowed
// via `mark_hot`; detector contracts rely only on the deterministic
// classification above.
//
// Preconditions: none.
// Postconditions: repeated queries for the same function return the same
//   verdict within a run.
// Failure modes: invalid glob patterns are logged and skipped.
// Side effects: none beyond the memo table.

use std::cell::RefCell;
use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::config::Config;
use crate::tu::FunctionDecl;

/// Literal annotation string that marks a function hot at the source level.
pub const HOT_ANNOTATION: &str = "faultline_hot";

pub struct HotPathOracle {
    function_globs: GlobSet,
    file_globs: GlobSet,
    memo: RefCell<HashMap<String, bool>>,
}

impl HotPathOracle {
    pub fn new(config: &Config) -> Self {
        Self {
            function_globs: compile_globs(&config.hot_function_patterns, "hot_function_patterns"),
            file_globs: compile_globs(&config.hot_file_patterns, "hot_file_patterns"),
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn is_hot(&self, func: &FunctionDecl) -> bool {
        if let Some(&hot) = self.memo.borrow().get(&func.qualified_name) {
            return hot;
        }
        let hot = self.classify(func);
        self.memo
            .borrow_mut()
            .insert(func.qualified_name.clone(), hot);
        hot
    }

    /// Force-mark a function hot (caller-inclusion population pass).
    pub fn mark_hot(&self, qualified_name: &str) {
        self.memo
            .borrow_mut()
            .insert(qualified_name.to_string(), true);
    }

    fn classify(&self, func: &FunctionDecl) -> bool {
        if func.attributes.iter().any(|a| a == HOT_ANNOTATION) {
            return true;
        }
        if self.function_globs.is_match(&func.qualified_name) {
            return true;
        }
        !func.loc.file.is_empty() && self.file_globs.is_match(&func.loc.file)
    }
}

fn compile_globs(patterns: &[String], what: &str) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("invalid {} pattern '{}': {}", what, pattern, e),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("cannot compile {} set: {}", what, e);
        GlobSet::empty()
    })
}
