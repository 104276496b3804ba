/*
    FluxFox
    https://github.com/dbalsom/fluxfox

    Copyright 2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/flush_queue.rs

    A single background worker that writes dirty tracks back to their images.
*/

//! Writing a track back to an image can involve re-encoding sectors and file I/O. A drive moving
//! its head off a dirty track should not wait for that, so the work is handed to a [FlushQueue].
//!
//! The queue owns one worker thread fed by a `crossbeam-channel`. Jobs run in the order they were
//! enqueued. [FlushQueue::drain] blocks until every job enqueued before it has finished. Dropping
//! the queue drains it and joins the worker.

use crossbeam_channel::{Receiver, Sender};
use std::{
    sync::{Arc, OnceLock},
    thread::JoinHandle,
};

pub(crate) type FlushJob = Box<dyn FnOnce() + Send + 'static>;

enum FlushMessage {
    Job(FlushJob),
    Drain(Sender<()>),
}

pub(crate) struct FlushQueue {
    sender: Option<Sender<FlushMessage>>,
    worker: Option<JoinHandle<()>>,
}

static SHARED_QUEUE: OnceLock<Arc<FlushQueue>> = OnceLock::new();

impl FlushQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<FlushMessage>();
        let worker = std::thread::Builder::new()
            .name("fluxfox-flush".to_string())
            .spawn(move || Self::run(receiver))
            .map_err(|e| log::error!("FlushQueue::new(): failed to start worker: {}", e))
            .ok();

        Self {
            sender: Some(sender),
            worker,
        }
    }

    /// Return the process-wide queue shared by every [Disk](crate::Disk).
    pub(crate) fn shared() -> Arc<FlushQueue> {
        SHARED_QUEUE.get_or_init(|| Arc::new(FlushQueue::new())).clone()
    }

    fn run(receiver: Receiver<FlushMessage>) {
        for message in receiver.iter() {
            match message {
                FlushMessage::Job(job) => job(),
                FlushMessage::Drain(done) => {
                    _ = done.send(());
                }
            }
        }
        log::trace!("FlushQueue::run(): channel closed, worker exiting");
    }

    /// Enqueue `job`. If the worker could not be started the job runs immediately on the calling
    /// thread.
    pub(crate) fn enqueue(&self, job: FlushJob) {
        match (&self.sender, &self.worker) {
            (Some(sender), Some(_)) => {
                if let Err(e) = sender.send(FlushMessage::Job(job)) {
                    log::error!("FlushQueue::enqueue(): worker is gone, running job inline");
                    if let FlushMessage::Job(job) = e.into_inner() {
                        job();
                    }
                }
            }
            _ => job(),
        }
    }

    /// Block until every job enqueued so far has run.
    pub(crate) fn drain(&self) {
        let (Some(sender), Some(_)) = (&self.sender, &self.worker)
        else {
            return;
        };
        let (done_sender, done_receiver) = crossbeam_channel::bounded(1);
        if sender.send(FlushMessage::Drain(done_sender)).is_ok() {
            _ = done_receiver.recv();
        }
    }
}

impl Drop for FlushQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish what is queued and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("FlushQueue::drop(): flush worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::Mutex,
        time::Duration,
    };

    #[test]
    fn test_jobs_run_in_order() {
        let queue = FlushQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let log = log.clone();
            queue.enqueue(Box::new(move || {
                // Earlier jobs sleep longer; order must still hold.
                std::thread::sleep(Duration::from_millis((16 - i) as u64));
                log.lock().unwrap().push(i);
            }));
        }
        queue.drain();
        assert_eq!(*log.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_drains() {
        let counter = Arc::new(Mutex::new(0));
        {
            let queue = FlushQueue::new();
            for _ in 0..8 {
                let counter = counter.clone();
                queue.enqueue(Box::new(move || {
                    std::thread::sleep(Duration::from_millis(2));
                    *counter.lock().unwrap() += 1;
                }));
            }
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}
