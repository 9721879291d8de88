mod data;

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::models::ChannelId;
use crate::models::EpgEvent;
use crate::models::Timer;

pub use data::ProviderData;
pub use data::StaticProvider;

/// An object allocated by an enrichment provider for a single call.
///
/// The object is released when this value is dropped.  A provider can attach
/// a hook which runs exactly once at that point.
pub struct Provided<T> {
    value: T,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<T> Provided<T> {
    pub fn new(value: T) -> Self {
        Provided {
            value,
            release: None,
        }
    }

    pub fn with_release<F>(value: T, release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Provided {
            value,
            release: Some(Box::new(release)),
        }
    }
}

impl<T> Deref for Provided<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> fmt::Debug for Provided<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provided")
            .field("value", &self.value)
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl<T> Drop for Provided<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// A value either borrowed from a primary registry or owned by the caller.
///
/// Dropping a `Borrowed` never touches the registry.  Dropping an `Owned`
/// releases the provider object.
pub enum Sourced<'a, T> {
    Borrowed(&'a T),
    Owned(Provided<T>),
}

impl<T> Sourced<'_, T> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Sourced::Owned(_))
    }
}

impl<T> Deref for Sourced<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Sourced::Borrowed(value) => *value,
            Sourced::Owned(value) => &**value,
        }
    }
}

#[async_trait]
pub trait ProgramLookup: Send + Sync {
    /// Returns an enriched version of `event`, or `None` if the provider
    /// knows nothing about it.
    async fn lookup_event(
        &self,
        channel_id: &ChannelId,
        event: &EpgEvent,
    ) -> Result<Option<Provided<EpgEvent>>, Error>;
}

#[async_trait]
pub trait TimerListing: Send + Sync {
    async fn list_timers(&self) -> Result<Vec<Provided<Timer>>, Error>;
}

pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &str;

    fn program_lookup(&self) -> Option<&dyn ProgramLookup> {
        None
    }

    fn timer_listing(&self) -> Option<&dyn TimerListing> {
        None
    }
}

#[derive(Clone, Default)]
pub enum Enrichment {
    #[default]
    Absent,
    Present(Arc<dyn EnrichmentProvider>),
}

impl Enrichment {
    pub fn is_present(&self) -> bool {
        matches!(self, Enrichment::Present(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Enrichment::Absent => None,
            Enrichment::Present(provider) => Some(provider.name()),
        }
    }

    pub fn program_lookup(&self) -> Option<&dyn ProgramLookup> {
        match self {
            Enrichment::Absent => None,
            Enrichment::Present(provider) => provider.program_lookup(),
        }
    }

    pub fn timer_listing(&self) -> Option<&dyn TimerListing> {
        match self {
            Enrichment::Absent => None,
            Enrichment::Present(provider) => provider.timer_listing(),
        }
    }
}

/// Enrichment providers available in the process, keyed by their names.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn EnrichmentProvider>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn EnrichmentProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::warn!(provider.name = name, "Replaced");
        } else {
            tracing::info!(provider.name = name, "Registered");
        }
    }

    pub fn discover(&self, name: Option<&str>) -> Enrichment {
        match name.and_then(|name| self.providers.get(name)) {
            Some(provider) => Enrichment::Present(provider.clone()),
            None => Enrichment::Absent,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::stub::*;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_provided_release_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let provided = {
            let count = count.clone();
            Provided::with_release(1, move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(*provided, 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(provided);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sourced() {
        let value = 1;
        let borrowed = Sourced::Borrowed(&value);
        assert!(!borrowed.is_owned());
        assert_eq!(*borrowed, 1);

        let owned: Sourced<'_, i32> = Sourced::Owned(Provided::new(2));
        assert!(owned.is_owned());
        assert_eq!(*owned, 2);
    }

    #[test]
    fn test_discover() {
        let mut providers = ProviderRegistry::default();
        providers.register(Arc::new(CountingProvider::default()));
        providers.register(Arc::new(IncapableProvider));

        let enrichment = providers.discover(None);
        assert!(!enrichment.is_present());
        assert!(enrichment.program_lookup().is_none());
        assert!(enrichment.timer_listing().is_none());

        let enrichment = providers.discover(Some("epg2vdr"));
        assert!(!enrichment.is_present());

        let enrichment = providers.discover(Some("counting"));
        assert!(enrichment.is_present());
        assert_eq!(enrichment.name(), Some("counting"));
        assert!(enrichment.program_lookup().is_some());
        assert!(enrichment.timer_listing().is_some());

        let enrichment = providers.discover(Some("incapable"));
        assert!(enrichment.is_present());
        assert!(enrichment.program_lookup().is_none());
        assert!(enrichment.timer_listing().is_none());
    }
}
// </coverage:exclude>
