use serde::Serialize;

/// Personal access token used to sign in to a Tableau site
#[derive(Clone)]
pub struct PersonalAccessToken {
    pub name: String,
    pub secret: String,
}

impl PersonalAccessToken {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }

    /// Body of `POST /api/{version}/auth/signin`
    pub(crate) fn sign_in_request<'a>(&'a self, site: &'a str) -> SignInRequest<'a> {
        SignInRequest {
            credentials: SignInCredentials {
                personal_access_token_name: &self.name,
                personal_access_token_secret: &self.secret,
                site: SiteRef { content_url: site },
            },
        }
    }
}

impl std::fmt::Display for PersonalAccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PersonalAccessToken({})", self.name)
    }
}

#[derive(Serialize)]
pub(crate) struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInCredentials<'a> {
    personal_access_token_name: &'a str,
    personal_access_token_secret: &'a str,
    site: SiteRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef<'a> {
    content_url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_in_request_body() {
        let token = PersonalAccessToken::new("etl", "s3cr3t");
        let body = serde_json::to_value(token.sign_in_request("acme")).unwrap();
        assert_eq!(
            body,
            json!({
                "credentials": {
                    "personalAccessTokenName": "etl",
                    "personalAccessTokenSecret": "s3cr3t",
                    "site": {"contentUrl": "acme"}
                }
            })
        );
    }

    #[test]
    fn test_display_hides_secret() {
        let token = PersonalAccessToken::new("etl", "s3cr3t");
        assert_eq!(token.to_string(), "PersonalAccessToken(etl)");
    }
}
