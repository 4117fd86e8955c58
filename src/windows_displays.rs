//! Injected content enumeration (§6): `list_windows` / `list_displays`.
//!
//! The real enumeration primitive is platform-specific and out of
//! scope (§1); the default implementation here always reports an empty
//! list, which is a legal answer per §8 scenario 3 ("arrays may be
//! empty").

use crate::protocol::{DisplayInfo, WindowInfo};
use async_trait::async_trait;

#[async_trait]
pub trait ContentEnumerator: Send + Sync {
    async fn list_windows(&self) -> Vec<WindowInfo>;
    async fn list_displays(&self) -> Vec<DisplayInfo>;
}

pub struct EmptyEnumerator;

#[async_trait]
impl ContentEnumerator for EmptyEnumerator {
    async fn list_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }

    async fn list_displays(&self) -> Vec<DisplayInfo> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_enumerator_reports_no_content() {
        let e = EmptyEnumerator;
        assert!(e.list_windows().await.is_empty());
        assert!(e.list_displays().await.is_empty());
    }
}
