/// The store's single entry point: one JSON command in, one JSON response out.
///
/// Calls are synchronous and may block; the session always runs them on the
/// blocking pool. There is no error channel besides the response text, so a
/// failing implementation answers with something the parser rejects (an empty
/// string, or `{"error": "..."}`).
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, command: &str) -> String;
}

impl<F> Executor for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn execute(&self, command: &str) -> String {
        self(command)
    }
}
