//! Platform "open" action
//!
//! Hands a URL or path to the operating system's default handler.

use crate::Result;
use crate::error::Error;

/// Something that can show a URL or file to the user
pub trait Opener: Send + Sync {
    fn open(&self, target: &str) -> Result<()>;
}

/// Opens targets with the OS default handler (browser for URLs)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(&self, target: &str) -> Result<()> {
        tracing::debug!("Opening {}", target);
        open::that(target).map_err(|e| Error::Open {
            target: target.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl Opener for Refusing {
        fn open(&self, target: &str) -> Result<()> {
            Err(Error::Open {
                target: target.to_string(),
                reason: "no handler".to_string(),
            })
        }
    }

    #[test]
    fn test_open_error_names_target() {
        let opener: &dyn Opener = &Refusing;
        let err = opener.open("https://drive.google.com/file/d/x").unwrap_err();
        assert_eq!(err.to_string(), "Unable to open https://drive.google.com/file/d/x: no handler");
    }
}
