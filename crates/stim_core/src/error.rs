//! The error envelope.
//!
//! Every manager and orchestrator operation reports failure through an
//! [`Envelope`]: the name of the failing operation, a human-readable clause
//! describing what was being attempted, and the underlying cause. Causes may
//! themselves be envelopes, forming a chain that is unwrapped one level per
//! call boundary until a non-envelope leaf is reached.

/// A boxed error suitable for use as an envelope cause.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Uniform error envelope: which operation failed, in what context, and why.
#[derive(Debug, thiserror::Error)]
#[error("{origin}: {context}: {source}")]
pub struct Envelope {
    /// The operation that failed (e.g. `"ResourceManager.openSession"`).
    pub origin: &'static str,
    /// Human-readable clause (e.g. `"when opening a session for: demo"`).
    pub context: String,
    /// The underlying cause, possibly itself an [`Envelope`].
    #[source]
    pub source: Cause,
}

impl Envelope {
    /// Wrap an underlying cause in an envelope.
    pub fn new(origin: &'static str, context: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self {
            origin,
            context: context.into(),
            source: source.into(),
        }
    }

    /// Returns a closure suitable for `map_err`, capturing origin and context.
    pub fn wrap<E: Into<Cause>>(
        origin: &'static str,
        context: impl Into<String>,
    ) -> impl FnOnce(E) -> Self {
        let context = context.into();
        move |source| Self::new(origin, context, source)
    }

    /// The innermost non-envelope cause of this chain.
    #[must_use]
    pub fn leaf(&self) -> &(dyn std::error::Error + 'static) {
        let mut env = self;
        while let Some(inner) = env.source.downcast_ref::<Envelope>() {
            env = inner;
        }
        &*env.source
    }

    /// Unwraps the chain into a bulleted cause list, most specific last.
    ///
    /// This is the text presented by the terminal error dialog.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        let mut env = self;
        loop {
            lines.push(format!("- {}", env.context));
            match env.source.downcast_ref::<Envelope>() {
                Some(inner) => env = inner,
                None => {
                    lines.push(format!("- {}", env.source));
                    break;
                }
            }
        }
        lines.join("\n")
    }
}
