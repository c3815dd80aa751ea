use std::{io::Cursor, path::PathBuf};

use image::ImageFormat;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use tokio::fs::{copy, remove_file, File};

use crate::{domain::photo::Photo, error::SvResult, server::get_server_folder_path_array, tools::{image_tools::{resize_image, ImageSize}, log::{log_error, log_info, LogServiceType}, scheduler::{face_processing::FaceProcessingTask, SvSchedulerWhen, SvTaskType}, text_tools::sanitize_folder_name}};

use super::{error::{Error, Result}, users::ConnectedUser, ModelController};


#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PhotoQuery {
    pub after: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PhotoForAdd {
    pub name: String,
    pub mimetype: Option<String>,
}


impl ModelController {

    pub async fn get_photos(&self, query: PhotoQuery, requesting_user: &ConnectedUser) -> Result<Vec<Photo>> {
        let user_id = requesting_user.user_id()?;
        let photos = self.store.get_photos(&user_id, query).await?;
        Ok(photos)
    }

    pub async fn get_photo(&self, photo_id: &str, requesting_user: &ConnectedUser) -> Result<Photo> {
        let photo = self.store.get_photo(photo_id).await?.ok_or_else(|| Error::PhotoNotFound(photo_id.to_string()))?;
        requesting_user.check_owner(&photo.user)?;
        Ok(photo)
    }

    /// Store an uploaded photo and queue one background face-processing run
    /// for it. The caller gets the photo row back immediately; face records
    /// appear asynchronously once the pipeline has run.
    pub async fn upload_photo(&self, upload: PhotoForAdd, data: Vec<u8>, requesting_user: &ConnectedUser) -> SvResult<Photo> {
        let user_id = requesting_user.user_id()?;
        let source_hash = sha256::digest(&data as &[u8]);

        if let Some(existing) = self.store.get_photo_by_hash(&user_id, &source_hash).await? {
            return Err(Error::Duplicate(existing.id).into());
        }

        let photo_id = nanoid!();
        let filename = photo_filename(&photo_id, &upload.name);
        let mut path = get_server_folder_path_array(vec!["photos", &user_id]).await?;
        path.push(&filename);
        tokio::fs::write(&path, &data).await.map_err(Error::TokioIo)?;

        self.write_thumbnail(&user_id, &photo_id, &data).await;

        let photo = Photo {
            id: photo_id.clone(),
            user: user_id.clone(),
            name: filename,
            source_hash: Some(source_hash),
            mimetype: upload.mimetype.or_else(|| mime_guess::from_path(&upload.name).first().map(|m| m.to_string())),
            size: Some(data.len() as u64),
            added: None,
        };
        self.store.add_photo(photo.clone()).await?;
        let photo = self.get_photo(&photo_id, requesting_user).await?;

        self.scheduler.add(SvTaskType::FaceProcessing, SvSchedulerWhen::At(0), FaceProcessingTask { photo: photo_id.clone() }).await?;
        log_info(LogServiceType::Other, format!("Photo {} uploaded for user {}, face processing queued", photo_id, photo.user));

        Ok(photo)
    }

    async fn write_thumbnail(&self, user_id: &str, photo_id: &str, data: &[u8]) {
        let result: SvResult<()> = async {
            let mut path = get_server_folder_path_array(vec!["photos", user_id, ".thumbs"]).await?;
            path.push(format!("{}.jpg", photo_id));
            let mut out = Cursor::new(Vec::new());
            resize_image(data, &mut out, ImageSize::Small.to_size(), ImageFormat::Jpeg).map_err(|e| crate::error::Error::Image(e))?;
            tokio::fs::write(&path, out.into_inner()).await.map_err(Error::TokioIo)?;
            Ok(())
        }.await;
        // a photo without a preview is still a valid photo
        if let Err(error) = result {
            log_error(LogServiceType::Other, format!("Unable to write thumbnail for photo {}: {:#}", photo_id, error));
        }
    }

    pub async fn photo_path(&self, photo: &Photo) -> SvResult<PathBuf> {
        let mut path = get_server_folder_path_array(vec!["photos", &photo.user]).await?;
        path.push(&photo.name);
        Ok(path)
    }

    pub async fn photo_bytes(&self, photo: &Photo) -> SvResult<Vec<u8>> {
        let path = self.photo_path(photo).await?;
        let data = tokio::fs::read(&path).await.map_err(Error::TokioIo)?;
        Ok(data)
    }

    pub async fn photo_file(&self, photo_id: &str, size: Option<ImageSize>, requesting_user: &ConnectedUser) -> SvResult<(File, String)> {
        let photo = self.get_photo(photo_id, requesting_user).await?;
        let (path, mimetype) = if size.is_some() {
            let mut path = get_server_folder_path_array(vec!["photos", &photo.user, ".thumbs"]).await?;
            path.push(format!("{}.jpg", photo.id));
            (path, "image/jpeg".to_string())
        } else {
            let path = self.photo_path(&photo).await?;
            let mimetype = photo.mimetype.clone().unwrap_or_else(|| mime_guess::from_path(&photo.name).first_or_octet_stream().to_string());
            (path, mimetype)
        };
        let file = File::open(&path).await.map_err(|_| Error::NotFound(format!("File for photo {}", photo.id)))?;
        Ok((file, mimetype))
    }

    /// Delete the photo row (face records cascade with it), its files, and
    /// drop the user's embedding snapshot so removed faces stop matching.
    pub async fn remove_photo(&self, photo_id: &str, requesting_user: &ConnectedUser) -> SvResult<Photo> {
        let photo = self.get_photo(photo_id, requesting_user).await?;
        self.store.remove_photo(photo.id.clone()).await?;
        self.invalidate_face_cache(&photo.user).await;

        if let Ok(path) = self.photo_path(&photo).await {
            let _ = remove_file(&path).await;
        }
        if let Ok(mut thumb) = get_server_folder_path_array(vec!["photos", &photo.user, ".thumbs"]).await {
            thumb.push(format!("{}.jpg", photo.id));
            let _ = remove_file(&thumb).await;
        }
        Ok(photo)
    }

    /// Copy a processed photo into `organized/user_<id>/<person>/` for every
    /// named person recognized in it. Best-effort: failures are logged and
    /// never fail the pipeline run.
    pub async fn organize_photo(&self, photo: &Photo, person_names: &[String]) {
        for name in person_names {
            let result: SvResult<()> = async {
                let safe_name = sanitize_folder_name(name);
                if safe_name.is_empty() {
                    return Ok(());
                }
                let user_dir = format!("user_{}", photo.user);
                let mut target = get_server_folder_path_array(vec!["organized", &user_dir, &safe_name]).await?;
                target.push(&photo.name);
                if tokio::fs::metadata(&target).await.is_err() {
                    let source = self.photo_path(photo).await?;
                    copy(&source, &target).await.map_err(Error::TokioIo)?;
                    log_info(LogServiceType::Recognition, format!("Organized photo {} into {:?}", photo.id, target));
                }
                Ok(())
            }.await;
            if let Err(error) = result {
                log_error(LogServiceType::Recognition, format!("Unable to organize photo {} for '{}': {:#}", photo.id, name, error));
            }
        }
    }
}

fn photo_filename(photo_id: &str, original_name: &str) -> String {
    let extension = original_name.rsplit('.').next().filter(|e| e.len() <= 5 && *e != original_name);
    match extension {
        Some(ext) => format!("{}.{}", photo_id, ext.to_lowercase()),
        None => photo_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_keeps_extension() {
        assert_eq!(photo_filename("abc", "holiday.JPG"), "abc.jpg");
        assert_eq!(photo_filename("abc", "noextension"), "abc");
        assert_eq!(photo_filename("abc", "archive.tar.gz"), "abc.gz");
    }
}
