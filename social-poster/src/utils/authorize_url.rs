use urlencoding::encode;

/// Inputs for the provider's authorization endpoint redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub authorize_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
    pub code_challenge: &'a str,
}

impl AuthorizationRequest<'_> {
    /// Builds the authorization URL. Each value is percent-encoded on its own;
    /// scopes are space-joined first so the separator is encoded as `%20`.
    pub fn to_url(&self) -> String {
        let separator = if self.authorize_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.authorize_url,
            separator,
            encode(self.client_id),
            encode(self.redirect_uri),
            encode(&self.scopes.join(" ")),
            encode(self.state),
            encode(self.code_challenge),
        )
    }
}
