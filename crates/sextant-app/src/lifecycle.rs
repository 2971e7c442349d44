use std::fmt;

/// Phases an application moves through, in order.
///
/// `Registered` is skipped when the app has no registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Registered,
    Running,
    ShuttingDown,
    Stopped,
}

impl Lifecycle {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Registered => "registered",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_render_as_lowercase_words() {
        assert_eq!(Lifecycle::Created.to_string(), "created");
        assert_eq!(Lifecycle::ShuttingDown.to_string(), "shutting-down");
    }
}
