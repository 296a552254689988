use query_cache::ParameterBindings;

/// Per-execution hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHints {
    /// Drop the cached plan for this query before looking it up. Set this
    /// when the lock mode or fetch configuration changed since the plan was
    /// translated.
    pub invalidate_plan: bool,
    /// Consult and populate the result cache
    pub use_result_cache: bool,
    /// Pin the result after it is cached
    pub pin_result: bool,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self {
            invalidate_plan: false,
            use_result_cache: true,
            pin_result: false,
        }
    }
}

/// One query execution request
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub bindings: ParameterBindings,
    pub hints: ExecutionHints,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, bindings: ParameterBindings) -> Self {
        Self {
            text: text.into(),
            bindings,
            hints: ExecutionHints::default(),
        }
    }

    /// A request without parameters
    pub fn unbound(text: impl Into<String>) -> Self {
        Self::new(text, ParameterBindings::positional())
    }

    pub fn with_hints(mut self, hints: ExecutionHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn invalidate_plan(mut self) -> Self {
        self.hints.invalidate_plan = true;
        self
    }

    pub fn pin_result(mut self) -> Self {
        self.hints.pin_result = true;
        self
    }

    pub fn bypass_result_cache(mut self) -> Self {
        self.hints.use_result_cache = false;
        self
    }
}
