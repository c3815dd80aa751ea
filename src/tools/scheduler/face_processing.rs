use axum::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::SvResult, model::{users::ConnectedUser, ModelController}, tools::log::{log_info, LogServiceType}};

use super::SvSchedulerTask;

/// One queued pipeline run per uploaded photo. The upload handler returns
/// "processing accepted" immediately; this task does the detection, matching
/// and persistence off the request path. Errors bubble to the scheduler's
/// retry-with-backoff policy and the whole run re-executes from scratch
/// (detection is idempotent, persistence commits per photo or not at all).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FaceProcessingTask {
    pub photo: String,
}

#[async_trait]
impl SvSchedulerTask for FaceProcessingTask {
    async fn execute(&self, mc: ModelController) -> SvResult<()> {
        let connected_user = &ConnectedUser::ServerAdmin;
        let faces = mc.process_photo_faces(&self.photo, connected_user).await?;
        log_info(
            LogServiceType::Recognition,
            format!("Processed photo {}: {} face(s) stored", self.photo, faces.len()),
        );
        Ok(())
    }
}
