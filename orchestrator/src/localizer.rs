use crate::cache::{BundleKey, LookupCache};
use crate::clients::{ClientError, Localization, Message};
use crate::config::LocalizationConfig;
use sheets::LocalizationMap;
use std::sync::Arc;

/// Localization bundles for templates, served through the lookup cache.
pub struct Localizer {
    client: Arc<dyn Localization>,
    cache: LookupCache,
    config: LocalizationConfig,
}

impl Localizer {
    pub fn new(client: Arc<dyn Localization>, cache: LookupCache, config: LocalizationConfig) -> Self {
        Localizer {
            client,
            cache,
            config,
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.config.default_locale
    }

    pub async fn bundle(
        &self,
        tenant_id: &str,
        module: &str,
        locale: &str,
    ) -> Result<Arc<LocalizationMap>, ClientError> {
        let key = BundleKey::new(tenant_id, module, locale);
        if let Some(bundle) = self.cache.get(&key) {
            return Ok(bundle);
        }

        let messages = self.client.messages(tenant_id, module, locale).await?;
        let bundle: Arc<LocalizationMap> = Arc::new(
            messages
                .into_iter()
                .map(|m| (m.code, m.message))
                .collect(),
        );
        tracing::debug!(module, locale, messages = bundle.len(), "localization bundle loaded");
        self.cache.insert(key, bundle.clone());
        Ok(bundle)
    }

    /// Boundary names of the hierarchy plus template messages; template
    /// messages win on conflicting codes.
    pub async fn template_bundle(
        &self,
        tenant_id: &str,
        hierarchy_type: &str,
        locale: &str,
    ) -> Result<LocalizationMap, ClientError> {
        let boundaries = self
            .bundle(tenant_id, &self.config.boundary_module(hierarchy_type), locale)
            .await?;
        let schema = self
            .bundle(tenant_id, &self.config.schema_module, locale)
            .await?;

        let mut merged = (*boundaries).clone();
        merged.merge(&schema);
        Ok(merged)
    }

    /// Registers names of newly created boundaries under the hierarchy's
    /// boundary module.
    pub async fn upsert_boundary_names<'a, I>(
        &self,
        tenant_id: &str,
        hierarchy_type: &str,
        locale: &str,
        boundaries: I,
    ) -> Result<usize, ClientError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let module = self.config.boundary_module(hierarchy_type);
        let messages: Vec<Message> = boundaries
            .into_iter()
            .map(|(code, name)| Message {
                code: code.to_string(),
                message: name.to_string(),
                module: module.clone(),
                locale: locale.to_string(),
            })
            .collect();
        if messages.is_empty() {
            return Ok(0);
        }

        self.client.upsert(tenant_id, &messages).await?;
        self.cache
            .invalidate(&BundleKey::new(tenant_id, &module, locale));
        Ok(messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::testutils::InMemoryLocalization;

    fn localizer(client: Arc<InMemoryLocalization>) -> Localizer {
        Localizer::new(
            client,
            LookupCache::new(&CacheConfig::default()),
            LocalizationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_bundles_are_cached() {
        let client = Arc::new(InMemoryLocalization::new());
        client.add("rainmaker-hcm-admin-schemas", "HCM_README_SHEETNAME", "Read Me");
        let localizer = localizer(client.clone());

        let first = localizer
            .bundle("mz", "rainmaker-hcm-admin-schemas", "en_MZ")
            .await
            .unwrap();
        let second = localizer
            .bundle("mz", "rainmaker-hcm-admin-schemas", "en_MZ")
            .await
            .unwrap();
        assert_eq!(first.get("HCM_README_SHEETNAME"), "Read Me");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(client.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_template_bundle_merges_modules() {
        let client = Arc::new(InMemoryLocalization::new());
        client.add("rainmaker-boundary-admin", "MZ", "Mozambique");
        client.add("rainmaker-boundary-admin", "X", "boundary");
        client.add("rainmaker-hcm-admin-schemas", "X", "schema");
        let localizer = localizer(client);

        let bundle = localizer.template_bundle("mz", "ADMIN", "en_MZ").await.unwrap();
        assert_eq!(bundle.get("MZ"), "Mozambique");
        assert_eq!(bundle.get("X"), "schema");
    }

    #[tokio::test]
    async fn test_upsert_invalidates_bundle() {
        let client = Arc::new(InMemoryLocalization::new());
        let localizer = localizer(client.clone());

        let before = localizer
            .bundle("mz", "rainmaker-boundary-admin", "en_MZ")
            .await
            .unwrap();
        assert!(before.is_empty());

        let count = localizer
            .upsert_boundary_names("mz", "ADMIN", "en_MZ", [("MZ_01_LAKE", "Lake")])
            .await
            .unwrap();
        assert_eq!(count, 1);

        let after = localizer
            .bundle("mz", "rainmaker-boundary-admin", "en_MZ")
            .await
            .unwrap();
        assert_eq!(after.get("MZ_01_LAKE"), "Lake");
        assert_eq!(client.search_calls(), 2);
    }
}
