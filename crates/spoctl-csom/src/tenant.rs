//! Tenant context: site URL validation and administrative endpoint resolution.

use async_trait::async_trait;
use url::Url;

use crate::error::{CsomError, CsomResult};

const ADMIN_SUFFIX: &str = "-admin";

/// Site URL options accepted by tenant commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteUrlField {
    /// `--sourceUrl`
    Source,
    /// `--targetUrl`
    Target,
    /// `--archiveUrl`
    Archive,
}

impl SiteUrlField {
    /// CLI option name.
    #[must_use]
    pub const fn option_name(self) -> &'static str {
        match self {
            Self::Source => "sourceUrl",
            Self::Target => "targetUrl",
            Self::Archive => "archiveUrl",
        }
    }

    const fn missing_message(self) -> &'static str {
        match self {
            Self::Source => "Required source url is missing",
            Self::Target => "Required target url is missing",
            Self::Archive => "Required archive url is missing",
        }
    }
}

/// Resolves the tenant's administrative endpoint.
#[async_trait]
pub trait AdminUrlResolver: Send + Sync {
    /// Administrative site URL, always ending with `/`.
    async fn resolve_admin_url(&self) -> CsomResult<Url>;
}

/// The tenant a command operates on.
#[derive(Debug, Clone)]
pub struct TenantContext {
    root: Url,
    admin_override: Option<Url>,
}

impl TenantContext {
    /// Build a context from the tenant root URL.
    #[must_use]
    pub const fn new(root: Url) -> Self {
        Self {
            root,
            admin_override: None,
        }
    }

    /// Infer the tenant from the origin of a site URL.
    ///
    /// # Errors
    ///
    /// Returns the same [`CsomError::Validation`] messages as
    /// [`TenantContext::validate_site_url`] for a missing or non-https URL.
    pub fn from_site_url(field: SiteUrlField, raw: Option<&str>) -> CsomResult<Self> {
        let value = raw
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CsomError::validation(field.option_name(), field.missing_message()))?;
        let invalid = || {
            CsomError::validation(
                field.option_name(),
                format!("{value} is not a valid SharePoint Online site URL"),
            )
        };

        let mut root = Url::parse(value).map_err(|_| invalid())?;
        if root.scheme() != "https" || root.host_str().is_none() {
            return Err(invalid());
        }
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        Ok(Self::new(root))
    }

    /// Use `admin_url` instead of deriving it from the root.
    #[must_use]
    pub fn with_admin_override(mut self, admin_url: Option<Url>) -> Self {
        self.admin_override = admin_url;
        self
    }

    /// Tenant root URL.
    #[must_use]
    pub const fn root(&self) -> &Url {
        &self.root
    }

    /// Check that `raw` is present and names a site of this tenant.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::Validation`] with the missing-option message when
    /// `raw` is absent or blank, or an invalid-URL message otherwise.
    pub fn validate_site_url(&self, field: SiteUrlField, raw: Option<&str>) -> CsomResult<String> {
        let value = raw
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CsomError::validation(field.option_name(), field.missing_message()))?;

        let invalid = || {
            CsomError::validation(
                field.option_name(),
                format!("{value} is not a valid SharePoint Online site URL"),
            )
        };

        let parsed = Url::parse(value).map_err(|_| invalid())?;
        if parsed.scheme() != "https" {
            return Err(invalid());
        }
        match (parsed.host_str(), self.root.host_str()) {
            (Some(site_host), Some(tenant_host)) if site_host.eq_ignore_ascii_case(tenant_host) => {
                Ok(value.to_string())
            }
            _ => Err(invalid()),
        }
    }

    /// Derive the administrative URL from the tenant root.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::Validation`] when the root URL has no usable host.
    pub fn derive_admin_url(&self) -> CsomResult<Url> {
        let host = self
            .root
            .host_str()
            .ok_or_else(|| CsomError::validation("tenantUrl", "tenant URL has no host"))?;

        let (first, rest) = host.split_once('.').unwrap_or((host, ""));
        let admin_label = if first.ends_with(ADMIN_SUFFIX) {
            first.to_string()
        } else {
            format!("{first}{ADMIN_SUFFIX}")
        };
        let admin_host = if rest.is_empty() {
            admin_label
        } else {
            format!("{admin_label}.{rest}")
        };

        let mut admin = self.root.clone();
        admin
            .set_host(Some(&admin_host))
            .map_err(|err| CsomError::validation("tenantUrl", format!("invalid admin host: {err}")))?;
        admin.set_path("/");
        admin.set_query(None);
        admin.set_fragment(None);
        Ok(admin)
    }
}

#[async_trait]
impl AdminUrlResolver for TenantContext {
    async fn resolve_admin_url(&self) -> CsomResult<Url> {
        match &self.admin_override {
            Some(url) => Ok(with_trailing_slash(url.clone())),
            None => self.derive_admin_url(),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contoso() -> CsomResult<TenantContext> {
        let root = Url::parse("https://contoso.sharepoint.com")
            .map_err(|err| CsomError::validation("tenantUrl", err.to_string()))?;
        Ok(TenantContext::new(root))
    }

    #[test]
    fn missing_urls_use_exact_messages() -> CsomResult<()> {
        let tenant = contoso()?;
        let cases = [
            (SiteUrlField::Source, "Required source url is missing"),
            (SiteUrlField::Target, "Required target url is missing"),
            (SiteUrlField::Archive, "Required archive url is missing"),
        ];
        for (field, message) in cases {
            let err = tenant
                .validate_site_url(field, None)
                .err()
                .ok_or_else(|| CsomError::validation("test", "expected failure"))?;
            assert_eq!(err.to_string(), message);

            let blank = tenant.validate_site_url(field, Some("   "));
            assert!(matches!(blank, Err(CsomError::Validation { .. })));
        }
        Ok(())
    }

    #[test]
    fn rejects_urls_outside_tenant_or_not_https() -> CsomResult<()> {
        let tenant = contoso()?;
        for raw in [
            "http://contoso.sharepoint.com/sites/a",
            "https://fabrikam.sharepoint.com/sites/a",
            "not a url",
        ] {
            let err = tenant
                .validate_site_url(SiteUrlField::Target, Some(raw))
                .err()
                .ok_or_else(|| CsomError::validation("test", format!("{raw} accepted")))?;
            assert_eq!(
                err.to_string(),
                format!("{raw} is not a valid SharePoint Online site URL")
            );
        }
        Ok(())
    }

    #[test]
    fn accepts_tenant_sites_verbatim() -> CsomResult<()> {
        let tenant = contoso()?;
        let value = tenant.validate_site_url(
            SiteUrlField::Source,
            Some("https://contoso.sharepoint.com/sites/sourcesite"),
        )?;
        assert_eq!(value, "https://contoso.sharepoint.com/sites/sourcesite");
        Ok(())
    }

    #[test]
    fn infers_tenant_from_site_origin() -> CsomResult<()> {
        let tenant = TenantContext::from_site_url(
            SiteUrlField::Source,
            Some("https://contoso.sharepoint.com/sites/sourcesite?x=1"),
        )?;
        assert_eq!(tenant.root().as_str(), "https://contoso.sharepoint.com/");

        let err = TenantContext::from_site_url(SiteUrlField::Source, None)
            .err()
            .ok_or_else(|| CsomError::validation("test", "expected failure"))?;
        assert_eq!(err.to_string(), "Required source url is missing");
        Ok(())
    }

    #[tokio::test]
    async fn derives_admin_host() -> CsomResult<()> {
        let admin = contoso()?.resolve_admin_url().await?;
        assert_eq!(admin.as_str(), "https://contoso-admin.sharepoint.com/");

        let root = Url::parse("https://contoso-admin.sharepoint.com/sites/x")
            .map_err(|err| CsomError::validation("tenantUrl", err.to_string()))?;
        let admin = TenantContext::new(root).derive_admin_url()?;
        assert_eq!(admin.as_str(), "https://contoso-admin.sharepoint.com/");
        Ok(())
    }

    #[tokio::test]
    async fn override_gets_trailing_slash() -> CsomResult<()> {
        let override_url = Url::parse("http://127.0.0.1:8080/admin")
            .map_err(|err| CsomError::validation("adminUrl", err.to_string()))?;
        let admin = contoso()?
            .with_admin_override(Some(override_url))
            .resolve_admin_url()
            .await?;
        assert_eq!(admin.as_str(), "http://127.0.0.1:8080/admin/");
        Ok(())
    }
}
