/// Knobs for an [`crate::Interpreter`] instance.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Prefix of error positions, as in `input:3: attempt to ...`.
    pub chunk_name: String,

    /// Nested calls allowed before the run aborts with a stack overflow.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            chunk_name: "input".to_string(),
            max_call_depth: 7000,
        }
    }
}

impl InterpreterConfig {
    pub fn with_chunk_name<S: Into<String>>(mut self, name: S) -> Self {
        self.chunk_name = name.into();
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
