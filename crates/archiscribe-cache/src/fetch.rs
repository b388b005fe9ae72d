//! Line-fetch protocol: live progress plus one eventual result.
//!
//! A fetch is split in two halves. The producer holds a [`FetchReporter`] and
//! the consumer holds a [`LineFetch`]:
//!
//! - progress is a latest-value `watch` channel, so the producer overwrites
//!   and never waits on a consumer that stopped looking;
//! - the lines travel on a `oneshot`, delivered at most once;
//! - [`FetchReporter::finish`] and [`FetchReporter::fail`] consume the
//!   reporter, so exactly one terminal event can happen.

use std::future::Future;

use archiscribe_core::FetchError;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use crate::model::OcrLine;

/// Latest state of an in-flight fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchProgress {
    /// Fraction done in [0, 1], never decreasing
    Running(f64),
    /// Terminal error; no lines will follow
    Failed(FetchError),
}

/// Producer half of a fetch.
#[derive(Debug)]
pub struct FetchReporter {
    progress: watch::Sender<FetchProgress>,
    result: oneshot::Sender<Vec<OcrLine>>,
}

impl FetchReporter {
    /// Publish a progress fraction. Values are clamped to [0, 1]; anything
    /// not above the last published fraction is dropped.
    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        self.progress.send_if_modified(|current| match current {
            FetchProgress::Running(prev) if fraction > *prev => {
                *prev = fraction;
                true
            }
            _ => false,
        });
    }

    /// Deliver the lines. Closes the progress stream.
    pub fn finish(self, lines: Vec<OcrLine>) {
        self.report(1.0);
        // Receiver gone means nobody wants the result any more
        let _ = self.result.send(lines);
    }

    /// Terminate with an error. No lines are delivered.
    pub fn fail(self, error: FetchError) {
        self.progress.send_replace(FetchProgress::Failed(error));
    }

    pub fn complete(self, outcome: Result<Vec<OcrLine>, FetchError>) {
        match outcome {
            Ok(lines) => self.finish(lines),
            Err(e) => self.fail(e),
        }
    }
}

/// Aborts the producer task when the consumer goes away.
#[derive(Debug)]
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Consumer half of a fetch.
///
/// Dropping it before the outcome arrives cancels a producer started with
/// [`LineFetch::spawn`].
#[derive(Debug)]
pub struct LineFetch {
    progress: watch::Receiver<FetchProgress>,
    result: oneshot::Receiver<Vec<OcrLine>>,
    _producer: Option<AbortOnDrop>,
}

impl LineFetch {
    /// Connected reporter/fetch pair with no producer task attached.
    pub fn channel() -> (FetchReporter, Self) {
        let (progress_tx, progress_rx) = watch::channel(FetchProgress::Running(0.0));
        let (result_tx, result_rx) = oneshot::channel();
        let reporter = FetchReporter {
            progress: progress_tx,
            result: result_tx,
        };
        let fetch = Self {
            progress: progress_rx,
            result: result_rx,
            _producer: None,
        };
        (reporter, fetch)
    }

    /// Run `produce` on the runtime, handing it the reporter.
    ///
    /// A producer that drops the reporter without finishing shows up as
    /// [`FetchError::Aborted`].
    pub fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(FetchReporter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (reporter, mut fetch) = Self::channel();
        let task = tokio::spawn(produce(reporter));
        fetch._producer = Some(AbortOnDrop(task.abort_handle()));
        fetch
    }

    /// A fetch that has already failed.
    pub fn failed(error: FetchError) -> Self {
        let (reporter, fetch) = Self::channel();
        reporter.fail(error);
        fetch
    }

    /// A fetch that has already delivered `lines`.
    pub fn ready(lines: Vec<OcrLine>) -> Self {
        let (reporter, fetch) = Self::channel();
        reporter.finish(lines);
        fetch
    }

    /// Independent view of the progress stream.
    ///
    /// `changed()` errors once the producer is done; the outcome is then
    /// available from [`LineFetch::outcome`].
    pub fn subscribe(&self) -> watch::Receiver<FetchProgress> {
        self.progress.clone()
    }

    /// Last published fraction (0 after a failure).
    pub fn fraction(&self) -> f64 {
        match *self.progress.borrow() {
            FetchProgress::Running(f) => f,
            FetchProgress::Failed(_) => 0.0,
        }
    }

    /// Wait for the terminal event.
    ///
    /// Needs no one to have read any progress event first.
    pub async fn outcome(mut self) -> Result<Vec<OcrLine>, FetchError> {
        match (&mut self.result).await {
            Ok(lines) => Ok(lines),
            // fail() publishes the error before the result sender drops
            Err(_) => match &*self.progress.borrow() {
                FetchProgress::Failed(e) => Err(e.clone()),
                FetchProgress::Running(_) => Err(FetchError::Aborted),
            },
        }
    }
}

/// Reports whether a document is printed in the target script.
pub trait ScriptClassifier: Send + Sync + 'static {
    fn is_target_script(
        &self,
        identifier: &str,
    ) -> impl Future<Output = Result<bool, FetchError>> + Send;
}

/// Produces the OCR lines of one document.
pub trait LineSource: Send + Sync + 'static {
    fn fetch_lines(&self, identifier: &str) -> LineFetch;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn lines(n: usize) -> Vec<OcrLine> {
        (0..n).map(|i| OcrLine::new(format!("line{i}.jpg"))).collect()
    }

    #[tokio::test]
    async fn result_without_reading_progress() {
        let fetch = LineFetch::spawn(|reporter| async move {
            for i in 0..1000 {
                reporter.report(f64::from(i) / 1000.0);
            }
            reporter.finish(lines(3));
        });
        assert_eq!(fetch.outcome().await.unwrap(), lines(3));
    }

    #[tokio::test]
    async fn fractions_never_decrease() {
        let (reporter, fetch) = LineFetch::channel();
        reporter.report(0.4);
        reporter.report(0.2);
        assert_eq!(fetch.fraction(), 0.4);
        reporter.report(f64::NAN);
        reporter.report(7.0);
        assert_eq!(fetch.fraction(), 1.0);
        reporter.finish(lines(1));
        assert_eq!(fetch.outcome().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_report_does_not_wake_observer() {
        let (reporter, fetch) = LineFetch::channel();
        let mut rx = fetch.subscribe();
        reporter.report(0.5);
        let _ = rx.borrow_and_update();
        reporter.report(0.3);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let fetch = LineFetch::spawn(|reporter| async move {
            reporter.report(0.3);
            reporter.fail(FetchError::NoLines);
        });
        let mut rx = fetch.subscribe();
        assert_eq!(fetch.outcome().await, Err(FetchError::NoLines));
        // Producer is gone: the last value is the error and the stream is closed
        assert_eq!(*rx.borrow_and_update(), FetchProgress::Failed(FetchError::NoLines));
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn dropped_reporter_is_aborted() {
        let fetch = LineFetch::spawn(|reporter| async move {
            reporter.report(0.5);
            drop(reporter);
        });
        assert_eq!(fetch.outcome().await, Err(FetchError::Aborted));
    }

    #[tokio::test]
    async fn ready_and_failed_shortcuts() {
        assert_eq!(LineFetch::ready(lines(2)).outcome().await.unwrap().len(), 2);
        let err = LineFetch::failed(FetchError::Malformed("x".into()))
            .outcome()
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Malformed("x".into()));
    }

    #[tokio::test]
    async fn dropping_fetch_cancels_producer() {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = SetOnDrop(cancelled.clone());
        let fetch = LineFetch::spawn(move |reporter| async move {
            let _flag = flag;
            let _reporter = reporter;
            std::future::pending::<()>().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(fetch);

        for _ in 0..100 {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("producer still running after the fetch was dropped");
    }
}
