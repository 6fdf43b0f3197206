//! Set-Cookie construction.
//!
//! A [`Cookie`] serializes to one `Set-Cookie` header value with its
//! attributes in a fixed order: `name=value; Domain; Path; Max-Age;
//! Expires; Secure; HttpOnly; SameSite`. Prefixed names are validated at
//! build time: `__Secure-` requires the Secure flag, `__Host-` requires
//! Secure, no Domain and `Path=/`.

use std::time::{Duration, SystemTime};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CookieError {
    #[error("__Secure- cookies require the Secure flag")]
    SecurePrefixWithoutSecure,

    #[error("__Host- cookies require Secure, an empty Domain and Path=/")]
    HostPrefixViolated,
}

#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    max_age: Option<Duration>,
    secure: bool,
    http_only: bool,
    same_site: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: impl Into<String>) -> Self {
        self.same_site = Some(same_site.into());
        self
    }

    /// Validates the prefix rules and serializes the header value.
    pub fn build(self) -> Result<String, CookieError> {
        if self.name.starts_with("__Secure-") && !self.secure {
            return Err(CookieError::SecurePrefixWithoutSecure);
        }

        if self.name.starts_with("__Host-") && (!self.secure || !self.domain.is_empty() || self.path != "/") {
            return Err(CookieError::HostPrefixViolated);
        }

        let mut out = format!("{}={}", self.name, self.value);

        if !self.domain.is_empty() {
            out.push_str("; Domain=");
            out.push_str(&self.domain);
        }

        if !self.path.is_empty() {
            out.push_str("; Path=");
            out.push_str(&self.path);
        }

        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));

            let expires = httpdate::fmt_http_date(SystemTime::now() + max_age);
            out.push_str("; Expires=");
            out.push_str(&expires);
        }

        if self.secure {
            out.push_str("; Secure");
        }

        if self.http_only {
            out.push_str("; HttpOnly");
        }

        if let Some(same_site) = &self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site);
        }

        Ok(out)
    }
}
