use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::header::{self, HeaderMap, HeaderValue, InvalidHeaderValue};

use crate::session::coordinator::CookieAction;

/// Cookie name used when none is configured
pub const DEFAULT_COOKIE_NAME: &str = "easySession";

/// Attributes applied to the session cookie
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<Duration>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: None,
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
        }
    }
}

/// Builds and reads the session cookie
///
/// Values are written and read verbatim. The identifier is already
/// percent-encoded, so no additional cookie encoding is applied.
#[derive(Debug, Clone)]
pub struct CookieFactory {
    name: String,
    options: CookieOptions,
}

impl CookieFactory {
    #[must_use]
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie carrying `value` with the configured attributes
    #[must_use]
    pub fn session_cookie(&self, value: &str) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), value.to_owned());
        cookie.set_http_only(self.options.http_only);
        cookie.set_secure(self.options.secure);
        if let Some(same_site) = self.options.same_site {
            cookie.set_same_site(same_site);
        }
        if let Some(path) = &self.options.path {
            cookie.set_path(path.clone());
        }
        if let Some(domain) = &self.options.domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(max_age) = self.options.max_age {
            cookie.set_max_age(max_age);
        }
        cookie
    }

    /// Cookie instructing the client to drop the session cookie
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.session_cookie("");
        cookie.make_removal();
        cookie
    }

    /// Check that both cookies this factory emits are valid header values
    ///
    /// Identifier values are always header-safe, so only the name and attributes
    /// can fail here.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or an attribute contains bytes not allowed in
    /// a header
    pub fn validate(&self) -> Result<(), InvalidHeaderValue> {
        HeaderValue::from_str(&self.session_cookie("value").to_string())?;
        HeaderValue::from_str(&self.removal_cookie().to_string())?;
        Ok(())
    }

    /// Raw value of the session cookie in `headers`, if any
    ///
    /// The first cookie with a matching name wins. Empty values count as absent.
    #[must_use]
    pub fn incoming_value(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter_map(|pair| Cookie::parse(pair).ok())
            .find(|cookie| cookie.name() == self.name)
            .map(|cookie| cookie.value().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// Append the `Set-Cookie` header for `action` to `headers`
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie cannot be represented as a header value
    pub fn apply(
        &self,
        action: &CookieAction,
        headers: &mut HeaderMap,
    ) -> Result<(), InvalidHeaderValue> {
        let cookie = match action {
            CookieAction::Set(value) => self.session_cookie(value),
            CookieAction::Clear => self.removal_cookie(),
        };
        let value = HeaderValue::from_str(&cookie.to_string())?;
        headers.append(header::SET_COOKIE, value);
        Ok(())
    }
}
