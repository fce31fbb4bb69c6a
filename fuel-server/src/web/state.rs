//! Application state for the web layer.

use crate::realtime::RealtimeChannel;
use crate::regions::RegionClassifier;
use crate::store::StationDataStore;

/// Shared application state.
///
/// Every field is a cheap handle; cloning the state clones handles, not data.
#[derive(Clone)]
pub struct AppState {
    /// The single owner of station data
    pub store: StationDataStore,

    /// Region assignment for counts and station details
    pub classifier: RegionClassifier,

    /// Realtime subscription, when one is configured
    pub realtime: Option<RealtimeChannel>,
}

impl AppState {
    pub fn new(store: StationDataStore, classifier: RegionClassifier) -> Self {
        Self {
            store,
            classifier,
            realtime: None,
        }
    }

    pub fn with_realtime(mut self, channel: RealtimeChannel) -> Self {
        self.realtime = Some(channel);
        self
    }
}
