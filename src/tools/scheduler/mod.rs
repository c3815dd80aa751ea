use std::{collections::{HashMap, HashSet}, pin::Pin, sync::Arc};

use axum::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{error::SvResult, model::ModelController};

use self::face_processing::FaceProcessingTask;

use super::{get_time, log::{log_error, log_info, LogServiceType}};

pub mod face_processing;

const TICK_SECONDS: u64 = 2;

/// Background task runner: one queued item per scheduled run, executed off
/// the caller's context. A failed run is requeued with exponential backoff
/// (2^attempt seconds) until `max_retries` is exhausted, then marked
/// permanently failed in the logs. Runs for different items execute
/// independently, without ordering guarantees.
#[derive(Debug, Clone)]
pub struct SvScheduler {
    max_retries: u32,
    queue: Arc<Mutex<HashSet<SvSchedulerItem>>>,
    running: Arc<Mutex<HashMap<SvSchedulerItem, SvRunningTask>>>,
    token: Arc<RwLock<Option<CancellationToken>>>
}

impl SvScheduler {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            queue: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(Mutex::new(HashMap::new())),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn start(&self, mc: ModelController) -> SvResult<()> {
        let mut token = self.token.write().await;
        if let Some(token) = &mut *token {
            token.cancel();
        }
        let new_token = CancellationToken::new();
        let cloned_token = new_token.clone();
        let cloned_self = self.clone();
        tokio::spawn(async move {
            while !cloned_token.is_cancelled() {
                cloned_self.tick(mc.clone()).await;
                tokio::time::sleep(tokio::time::Duration::from_secs(TICK_SECONDS)).await;
            }
            log_info(LogServiceType::Scheduler, "Scheduler stopped".into());
        });
        *token = Some(new_token);
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(token) = &*self.token.read().await {
            token.cancel();
        }
    }

    /// Queue a task. `when` is a unix timestamp in seconds; use
    /// `SvSchedulerWhen::At(0)` to run as soon as possible.
    pub async fn add<T: Serialize>(&self, kind: SvTaskType, when: SvSchedulerWhen, params: T) -> SvResult<()> {
        let serialized = serde_json::to_string(&params)?;
        let item = SvSchedulerItem {
            kind,
            task: serialized,
            when,
            created: get_time().as_secs(),
            attempt: 0,
        };
        let mut queue = self.queue.lock().await;
        queue.insert(item);
        Ok(())
    }

    async fn readd(&self, mut item: SvSchedulerItem) -> SvResult<()> {
        item.created = get_time().as_secs();
        let mut queue = self.queue.lock().await;
        queue.insert(item);
        Ok(())
    }

    pub async fn tick(&self, mc: ModelController) {
        let mut queue = self.queue.lock().await;
        let now = get_time().as_secs();
        let tasks: Vec<SvSchedulerItem> = queue.iter().filter(|t| t.schedule_time() <= now).cloned().collect();
        for task in tasks {
            let item = queue.take(&task);
            if let Some(item) = item {
                let scheduler = self.clone();
                let mc = mc.clone();
                tokio::spawn(async move {
                    let task = {
                        let mut running = scheduler.running.lock().await;
                        let token = CancellationToken::new();
                        log_info(LogServiceType::Scheduler, format!("Starting task {:?}", item));

                        let task = match item.to_task() {
                            Ok(task) => task,
                            Err(error) => {
                                log_error(LogServiceType::Scheduler, format!("Unable to deserialize task {:?} {:#}", item, error));
                                return;
                            }
                        };
                        running.insert(item.clone(), SvRunningTask {
                            token,
                        });
                        task
                    };
                    let exec_request = task.execute(mc).await;
                    {
                        let mut running = scheduler.running.lock().await;
                        running.remove(&item);
                    }
                    let requeue = match exec_request {
                        Ok(_) => {
                            match item.when {
                                SvSchedulerWhen::At(_) => None,
                                SvSchedulerWhen::Every(_) => {
                                    let mut item = item;
                                    item.attempt = 0;
                                    Some(item)
                                }
                            }
                        }
                        Err(error) => {
                            if item.attempt < scheduler.max_retries {
                                let mut item = item;
                                item.attempt += 1;
                                let delay = retry_delay_seconds(item.attempt);
                                log_error(LogServiceType::Scheduler, format!("Task {:?} failed (attempt {}), retrying in {}s: {:#}", item.kind, item.attempt, delay, error));
                                item.when = SvSchedulerWhen::At(get_time().as_secs() + delay);
                                Some(item)
                            } else {
                                log_error(LogServiceType::Scheduler, format!("Task {:?} permanently failed after {} attempts: {:#}", item.kind, item.attempt + 1, error));
                                None
                            }
                        }
                    };
                    if let Some(item) = requeue {
                        if let Err(error) = scheduler.readd(item.clone()).await {
                            log_error(LogServiceType::Scheduler, format!("Unable to reschedule task {:?}, {:#}", item, error))
                        }
                    }
                });
            } else {
                log_error(LogServiceType::Scheduler, format!("Unexpected disappeared task {:?}", item))
            }
        }
    }

    pub async fn is_cancelled(&self) -> bool {
        if let Some(token) = &*self.token.read().await {
            token.is_cancelled()
        } else {
            true
        }
    }

    #[cfg(test)]
    pub(crate) async fn queued_items(&self) -> Vec<SvSchedulerItem> {
        self.queue.lock().await.iter().cloned().collect()
    }
}

/// Exponential backoff: 2^attempt seconds.
pub fn retry_delay_seconds(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt)
}

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct SvSchedulerItem {
    kind: SvTaskType,
    task: String,
    when: SvSchedulerWhen,
    created: u64,
    attempt: u32,
}

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub enum SvSchedulerWhen {
    At(u64),
    Every(u64)
}

#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub enum SvTaskType {
    FaceProcessing,
    #[cfg(test)]
    Test,
}

#[derive(Debug)]
pub struct SvRunningTask {
    #[allow(dead_code)]
    token: CancellationToken,
}

impl SvSchedulerItem {
    pub fn to_task(&self) -> SvResult<Pin<Box<dyn SvSchedulerTask + Send>>> {
        match self.kind {
            SvTaskType::FaceProcessing => {
                let deserialized: FaceProcessingTask = serde_json::from_str(&self.task)?;
                Ok(Box::pin(deserialized))
            },
            #[cfg(test)]
            SvTaskType::Test => {
                let deserialized: tests::TestTask = serde_json::from_str(&self.task)?;
                Ok(Box::pin(deserialized))
            },
        }
    }

    pub fn schedule_time(&self) -> u64 {
        match self.when {
            SvSchedulerWhen::At(at) => at,
            SvSchedulerWhen::Every(seconds) => self.created + seconds,
        }
    }

    #[cfg(test)]
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    #[cfg(test)]
    pub(crate) fn force_due(&mut self) {
        self.when = SvSchedulerWhen::At(0);
    }
}

#[async_trait]
pub trait SvSchedulerTask {
    async fn execute(&self, mc: ModelController) -> SvResult<()>;
}
