//! Generated application routes.

/// Listing of all conversations of the signed-in user
pub fn conversations_path() -> &'static str {
    "/v2/conversations"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_paths() {
        assert_eq!(conversations_path(), "/v2/conversations");
    }
}
