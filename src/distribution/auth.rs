use crate::{auth::Credential, error::*};
use serde::Deserialize;
use url::Url;

/// WWW-Authenticate challenge
///
/// ```
/// use regclient::distribution::AuthChallenge;
///
/// let auth = AuthChallenge::from_header(
///   r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:example/app:pull""#,
/// ).unwrap();
///
/// assert_eq!(auth, AuthChallenge::Bearer {
///   realm: "https://ghcr.io/token".to_string(),
///   service: Some("ghcr.io".to_string()),
///   scope: Some("repository:example/app:pull".to_string()),
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl AuthChallenge {
    pub fn from_header(header: &str) -> Result<Self> {
        let err = || Error::UnsupportedAuthHeader(header.to_string());
        let (ty, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if ty.eq_ignore_ascii_case("basic") {
            return Ok(AuthChallenge::Basic);
        }
        if !ty.eq_ignore_ascii_case("bearer") {
            return Err(err());
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for param in split_params(params) {
            let (key, value) = param.split_once('=').ok_or_else(err)?;
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => continue,
            }
        }
        Ok(AuthChallenge::Bearer {
            realm: realm.ok_or_else(err)?,
            service,
            scope,
        })
    }

    /// Value of the `Authorization` header answering this challenge
    pub fn authorize(
        &self,
        agent: &ureq::Agent,
        credential: Option<&Credential>,
    ) -> Result<String> {
        match self {
            AuthChallenge::Basic => match credential {
                Some(credential) => Ok(format!("Basic {}", credential.encode())),
                None => Err(Error::Auth(
                    "registry requires credentials, none configured".to_string(),
                )),
            },
            AuthChallenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let mut url = Url::parse(realm)?;
                {
                    let mut query = url.query_pairs_mut();
                    if let Some(service) = service {
                        query.append_pair("service", service);
                    }
                    if let Some(scope) = scope {
                        query.append_pair("scope", scope);
                    }
                }
                log::info!("GET {}", url);
                let mut req = agent.get(url.as_str()).set("Accept", "application/json");
                if let Some(credential) = credential {
                    req = req.set("Authorization", &format!("Basic {}", credential.encode()));
                }
                match req.call() {
                    Ok(res) => {
                        let token = res.into_json::<Token>()?;
                        token
                            .token
                            .or(token.access_token)
                            .map(|token| format!("Bearer {}", token))
                            .ok_or_else(|| Error::Auth(format!("no token in response of {}", url)))
                    }
                    Err(ureq::Error::Status(..)) => Err(Error::Auth(url.to_string())),
                    Err(ureq::Error::Transport(e)) => Err(Error::Network(e.into())),
                }
            }
        }
    }
}

/// Split `k1="v1",k2="a,b"` on commas outside of quotes
fn split_params(params: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                out.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&params[start..]);
    out.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

#[derive(Deserialize)]
struct Token {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_challenge() {
        assert_eq!(
            AuthChallenge::from_header(r#"Basic realm="Registry Realm""#).unwrap(),
            AuthChallenge::Basic
        );
    }

    #[test]
    fn scope_with_comma() {
        let challenge = AuthChallenge::from_header(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/ubuntu:pull,push""#,
        )
        .unwrap();
        assert_eq!(
            challenge,
            AuthChallenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
                scope: Some("repository:library/ubuntu:pull,push".to_string()),
            }
        );
    }

    #[test]
    fn catalog_challenge_without_scope() {
        let challenge =
            AuthChallenge::from_header(r#"Bearer realm="http://localhost/token""#).unwrap();
        assert!(matches!(
            challenge,
            AuthChallenge::Bearer { service: None, scope: None, .. }
        ));
    }

    #[test]
    fn unsupported() {
        assert!(AuthChallenge::from_header("Digest realm=\"x\"").is_err());
        assert!(AuthChallenge::from_header("Bearer service=\"x\"").is_err());
    }

    #[test]
    fn basic_without_credential() {
        let agent = ureq::Agent::new();
        assert!(matches!(
            AuthChallenge::Basic.authorize(&agent, None),
            Err(Error::Auth(_))
        ));
        let credential = Credential::new("user", "pass");
        assert_eq!(
            AuthChallenge::Basic
                .authorize(&agent, Some(&credential))
                .unwrap(),
            "Basic dXNlcjpwYXNz"
        );
    }
}
