//! Generator trait, the boundary to whatever turns a rendered prompt into
//! text (an LLM client, a cache, a test double).
//!
//! The combination layer invokes a generator exactly once per combine call
//! with the fully rendered prompt, and propagates its errors untouched.

use crate::error::Result;
use async_trait::async_trait;

/// Produces text from a rendered prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generates a reply, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Implementations report failures with [`crate::Error::Generator`].
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Generates a reply without blocking.
    ///
    /// The default delegates to [`Generator::generate`]; network-backed
    /// implementations should override it.
    ///
    /// # Errors
    ///
    /// Same as [`Generator::generate`].
    async fn agenerate(&self, prompt: &str) -> Result<String> {
        self.generate(prompt)
    }
}

/// Returns the rendered prompt unchanged.
///
/// Useful when the combined prompt itself is the product, e.g. to hand it to
/// a separate client or to inspect what would be sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_generate() {
        assert_eq!(EchoGenerator.generate("prompt").unwrap(), "prompt");
        assert_eq!(EchoGenerator.name(), "echo");
    }

    #[tokio::test]
    async fn test_echo_agenerate_delegates() {
        assert_eq!(EchoGenerator.agenerate("prompt").await.unwrap(), "prompt");
    }
}
