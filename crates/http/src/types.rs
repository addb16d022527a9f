//! Wire types of the authentication endpoints

use serde::{Deserialize, Serialize};
use tessera_core::Token;

/// Body returned by the login and refresh endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: Token,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_ignores_extra_fields() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"token":"abc","user":{"id":1}}"#).unwrap();
        assert_eq!(body.token, Token::from("abc"));
    }
}
