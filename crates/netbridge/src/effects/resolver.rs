use std::path::Path;

use bytes::Bytes;

use crate::data::{
    AuthChallenge, CacheDisposition, CachedResponse, ChallengeDisposition,
    DelayedRequestDisposition, HttpResponse, RedirectDisposition, ResponseDisposition, TaskHandle,
    TransportRequest,
};
use crate::effects::observer::{DataObserver, DownloadObserver, TaskObserver};

/// Per-event view of the observer tiers: the task's own observer first,
/// then the session observer, then the built-in default.
#[derive(Clone, Copy, Default)]
pub(crate) struct DelegateChain<'a> {
    task:    Option<&'a dyn TaskObserver>,
    session: Option<&'a dyn TaskObserver>,
}

impl<'a> DelegateChain<'a> {
    pub(crate) fn new(task: Option<&'a dyn TaskObserver>, session: Option<&'a dyn TaskObserver>) -> Self {
        Self { task, session }
    }

    fn tiers(&self) -> impl Iterator<Item = &'a dyn TaskObserver> {
        self.task.into_iter().chain(self.session)
    }

    fn first_answer<R>(&self, ask: impl Fn(&dyn TaskObserver) -> Option<R>) -> Option<R> {
        self.tiers().find_map(ask)
    }

    fn first_data_answer<R>(&self, ask: impl Fn(&dyn DataObserver) -> Option<R>) -> Option<R> {
        self.tiers().filter_map(|tier| tier.as_data()).find_map(ask)
    }

    pub(crate) fn forward(&self, notify: impl Fn(&dyn TaskObserver)) {
        self.tiers().for_each(notify);
    }

    pub(crate) fn forward_data(&self, notify: impl Fn(&dyn DataObserver)) {
        self.tiers().filter_map(|tier| tier.as_data()).for_each(notify);
    }

    pub(crate) fn forward_download(&self, notify: impl Fn(&dyn DownloadObserver)) {
        self.tiers().filter_map(|tier| tier.as_download()).for_each(notify);
    }

    pub(crate) fn redirection(
        &self,
        task: TaskHandle,
        response: &HttpResponse,
        proposed: TransportRequest,
    ) -> RedirectDisposition {
        self.first_answer(|tier| tier.will_perform_redirection(task, response, &proposed))
            .unwrap_or(RedirectDisposition::Follow(proposed))
    }

    pub(crate) fn challenge(&self, task: TaskHandle, challenge: &AuthChallenge) -> ChallengeDisposition {
        self.first_answer(|tier| tier.received_challenge(task, challenge))
            .unwrap_or_default()
    }

    pub(crate) fn delayed_request(
        &self,
        task: TaskHandle,
        request: &TransportRequest,
    ) -> DelayedRequestDisposition {
        self.first_answer(|tier| tier.will_begin_delayed_request(task, request))
            .unwrap_or_default()
    }

    pub(crate) fn response(&self, task: TaskHandle, response: &HttpResponse) -> ResponseDisposition {
        self.first_data_answer(|tier| tier.received_response(task, response))
            .unwrap_or_default()
    }

    pub(crate) fn cache(&self, task: TaskHandle, proposed: CachedResponse) -> CacheDisposition {
        self.first_data_answer(|tier| tier.will_cache_response(task, &proposed))
            .unwrap_or(CacheDisposition::Store(proposed))
    }

    pub(crate) fn received_data(&self, task: TaskHandle, data: &Bytes) {
        self.forward_data(|tier| tier.received_data(task, data));
    }

    pub(crate) fn finished_downloading(&self, task: TaskHandle, location: &Path) {
        self.forward_download(|tier| tier.finished_downloading(task, location));
    }
}
