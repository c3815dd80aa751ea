use std::time::Duration;

use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use futures::StreamExt;

use crate::{domain::{face::FaceRecord, people::Person, photo::Photo}, error::{Error as SvError, SvResult}, tools::{face_inference::EMBEDDING_DIM, log::{log_error, log_info, LogServiceType}, recognition::{match_embedding, FaceMatch, MatchScores, PersonEmbedding}}};

use super::{error::Error, people::PersonForInsert, users::ConnectedUser, ModelController};


#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PhotoFacesResult {
    pub photo: String,
    pub faces: Vec<FaceRecord>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FaceSearchResult {
    pub person: Option<Person>,
    pub scores: Option<MatchScores>,
    pub photos: Vec<Photo>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionStats {
    pub total_persons: u64,
    pub auto_created_persons: u64,
    pub named_persons: u64,
    pub total_faces_stored: u64,
    pub total_photos: u64,
    pub model_pipeline: String,
    pub embedding_dimensions: usize,
    pub matching_metric: String,
    pub cosine_threshold: f32,
}

/// People invented while processing one photo, visible to the following
/// faces of the same run but not yet committed. They land in the store in
/// the same transaction as the photo's face records.
#[derive(Default)]
struct ResolveSession {
    pending_people: Vec<PersonForInsert>,
    pending_candidates: Vec<PersonEmbedding>,
}

impl ModelController {

    /// The only read path into stored embeddings for matching: cached
    /// per-user snapshot, reloaded from the store when absent or expired.
    pub async fn user_embeddings(&self, user_id: &str) -> SvResult<Vec<PersonEmbedding>> {
        let store = self.store.clone();
        let uid = user_id.to_string();
        self.face_cache
            .get(user_id, move || async move { Ok(store.get_person_embeddings(&uid).await?) })
            .await
    }

    pub async fn invalidate_face_cache(&self, user_id: &str) {
        self.face_cache.invalidate(user_id).await;
    }

    /// Match one embedding against a user's known faces.
    pub async fn match_face(&self, user_id: &str, embedding: &[f32]) -> SvResult<FaceMatch> {
        let candidates = self.user_embeddings(user_id).await?;
        Ok(match_embedding(embedding, &candidates, self.recognition.cosine_threshold))
    }

    /// Resolve an embedding to a person, creating an auto-named placeholder
    /// when nothing matches. Runs match, creation and cache invalidation in
    /// the user's cache critical section, so two concurrent resolves for the
    /// same user are serialized.
    pub async fn resolve_person(&self, user_id: &str, embedding: &[f32]) -> SvResult<Person> {
        let slot = self.face_cache.user_slot(user_id).await;
        let mut guard = slot.lock().await;
        let store = self.store.clone();
        let uid = user_id.to_string();
        let candidates = self.face_cache
            .snapshot_or_load(user_id, &mut guard, move || async move { Ok(store.get_person_embeddings(&uid).await?) })
            .await?;

        let result = match_embedding(embedding, &candidates, self.recognition.cosine_threshold);
        if let Some(person) = result.person {
            log_info(LogServiceType::Recognition, format!("Match found for user {}: person '{}' cos_dist={:.4} sim={:.4}", user_id, person.name, result.scores.cosine_distance, result.scores.similarity));
            return Ok(person);
        }

        let count = self.store.count_auto_created_people(user_id).await?;
        let person = PersonForInsert {
            id: nanoid!(),
            user: user_id.to_string(),
            name: format!("Unknown Person {}", count + 1),
            auto_created: true,
        };
        self.store.add_person(person.clone()).await?;
        guard.clear();
        let person = self.store.get_person(&person.id).await?.ok_or_else(|| Error::PersonNotFound(person.id))?;
        log_info(LogServiceType::Recognition, format!("Auto-created person '{}' ({}) for user {}", person.name, person.id, user_id));
        Ok(person)
    }

    /// Pipeline-internal resolve: a miss books the new person in the run's
    /// session instead of committing it, so a second face of the same
    /// stranger in this photo matches the pending identity instead of
    /// spawning a duplicate.
    async fn resolve_in_session(&self, user_id: &str, embedding: &[f32], session: &mut ResolveSession) -> SvResult<(Person, MatchScores, bool)> {
        let slot = self.face_cache.user_slot(user_id).await;
        let mut guard = slot.lock().await;
        let store = self.store.clone();
        let uid = user_id.to_string();
        let mut candidates = self.face_cache
            .snapshot_or_load(user_id, &mut guard, move || async move { Ok(store.get_person_embeddings(&uid).await?) })
            .await?;
        candidates.extend(session.pending_candidates.iter().cloned());

        let result = match_embedding(embedding, &candidates, self.recognition.cosine_threshold);
        if let Some(person) = result.person {
            return Ok((person, result.scores, false));
        }

        let committed = self.store.count_auto_created_people(user_id).await?;
        let pending = session.pending_people.len() as u64;
        let insert = PersonForInsert {
            id: nanoid!(),
            user: user_id.to_string(),
            name: format!("Unknown Person {}", committed + pending + 1),
            auto_created: true,
        };
        let person = Person {
            id: insert.id.clone(),
            user: insert.user.clone(),
            name: insert.name.clone(),
            auto_created: true,
            added: None,
            modified: None,
        };
        session.pending_people.push(insert);
        session.pending_candidates.push(PersonEmbedding { person: person.clone(), embedding: embedding.to_vec() });
        Ok((person, result.scores, true))
    }

    /// Full pipeline for one photo: analyze, resolve every detected face to
    /// a person, persist all face records (and any people invented along the
    /// way) as one commit unit, refresh the cache, organize copies.
    pub async fn process_photo_faces(&self, photo_id: &str, requesting_user: &ConnectedUser) -> SvResult<Vec<FaceRecord>> {
        let photo = self.get_photo(photo_id, requesting_user).await?;
        let data = self.photo_bytes(&photo).await?;

        // a collaborator throw is "zero faces", never fatal; only a hang is
        // surfaced as a retryable failure
        let timeout = Duration::from_secs(self.recognition.detection_timeout_secs);
        let detected = match tokio::time::timeout(timeout, self.analyzer.analyze(data)).await {
            Err(_) => return Err(SvError::FaceAnalysisTimeout(photo.id.clone())),
            Ok(Err(error)) => {
                log_error(LogServiceType::Recognition, format!("Face analysis failed for photo {}, treating as zero faces: {:#}", photo.id, error));
                vec![]
            }
            Ok(Ok(detected)) => detected,
        };

        if detected.is_empty() {
            log_info(LogServiceType::Recognition, format!("No faces found in photo {}", photo.id));
            return Ok(vec![]);
        }

        let mut session = ResolveSession::default();
        let mut records: Vec<FaceRecord> = Vec::new();
        let mut matched_names: Vec<String> = Vec::new();

        for (idx, face) in detected.iter().enumerate() {
            let Some(embedding) = &face.embedding else {
                log_info(LogServiceType::Recognition, format!("Skipping face #{} in photo {}: empty embedding", idx, photo.id));
                continue;
            };

            let (person, scores, created) = self.resolve_in_session(&photo.user, embedding, &mut session).await?;
            if created {
                log_info(LogServiceType::Recognition, format!("Created new person '{}' for user {}", person.name, photo.user));
            } else {
                matched_names.push(person.name.clone());
                log_info(LogServiceType::Recognition, format!("Matched face #{} to '{}' (cos_dist={:.4}, sim={:.4})", idx, person.name, scores.cosine_distance, scores.similarity));
            }

            records.push(FaceRecord {
                id: nanoid!(),
                photo: photo.id.clone(),
                person: person.id,
                bbox: face.bbox,
                landmarks: face.landmarks.clone(),
                confidence: face.confidence,
                embedding: embedding.clone(),
                model_version: self.recognition.model_version.clone(),
                added: None,
            });
        }

        if records.is_empty() {
            return Ok(records);
        }

        self.store.add_faces_with_people(session.pending_people, records.clone()).await?;
        // the committed faces must show up in the next match
        self.invalidate_face_cache(&photo.user).await;

        if !matched_names.is_empty() {
            matched_names.sort();
            matched_names.dedup();
            self.organize_photo(&photo, &matched_names).await;
        }

        log_info(LogServiceType::Recognition, format!("Stored {} face(s) for photo {} (user {})", records.len(), photo.id, photo.user));
        Ok(records)
    }

    /// Run the pipeline over several photos with a bounded worker pool. One
    /// photo's failure yields an empty face list and a log line; it never
    /// aborts the sibling photos.
    pub async fn process_photos_batch(&self, photo_ids: Vec<String>, requesting_user: &ConnectedUser) -> Vec<PhotoFacesResult> {
        let limit = self.recognition.batch_concurrency.max(1);
        log_info(LogServiceType::Recognition, format!("Batch processing {} photo(s) with {} worker(s)", photo_ids.len(), limit));
        let results = futures::stream::iter(photo_ids.into_iter().map(|photo_id| {
            let mc = self.clone();
            let user = requesting_user.clone();
            async move {
                match mc.process_photo_faces(&photo_id, &user).await {
                    Ok(faces) => PhotoFacesResult { photo: photo_id, faces },
                    Err(error) => {
                        log_error(LogServiceType::Recognition, format!("Batch item {} failed: {:#}", photo_id, error));
                        PhotoFacesResult { photo: photo_id, faces: vec![] }
                    }
                }
            }
        }))
        .buffer_unordered(limit)
        .collect::<Vec<_>>()
        .await;
        log_info(LogServiceType::Recognition, format!("Batch complete, processed {} photo(s)", results.len()));
        results
    }

    pub async fn get_photo_faces(&self, photo_id: &str, requesting_user: &ConnectedUser) -> SvResult<Vec<FaceRecord>> {
        let photo = self.get_photo(photo_id, requesting_user).await?;
        Ok(self.store.get_faces_for_photo(&photo.id).await?)
    }

    pub async fn get_person_faces(&self, person_id: &str, requesting_user: &ConnectedUser) -> SvResult<Vec<FaceRecord>> {
        let person = self.get_person(person_id, requesting_user).await?;
        Ok(self.store.get_faces_for_person(&person.id).await?)
    }

    pub async fn remove_face(&self, face_id: &str, requesting_user: &ConnectedUser) -> SvResult<FaceRecord> {
        let face = self.store.get_face(face_id).await?.ok_or_else(|| Error::FaceNotFound(face_id.to_string()))?;
        let photo = self.get_photo(&face.photo, requesting_user).await?;
        self.store.remove_face(face.id.clone()).await?;
        self.invalidate_face_cache(&photo.user).await;
        Ok(face)
    }

    /// Face-based photo search: the first detected face of the query image is
    /// matched against the user's known people; on a match, all photos of
    /// that person come back. On no-match the closest-but-rejected distance
    /// is still reported.
    pub async fn search_photos_by_face(&self, data: Vec<u8>, requesting_user: &ConnectedUser) -> SvResult<FaceSearchResult> {
        let user_id = requesting_user.user_id()?;

        let timeout = Duration::from_secs(self.recognition.detection_timeout_secs);
        let detected = match tokio::time::timeout(timeout, self.analyzer.analyze(data)).await {
            Err(_) => return Err(SvError::FaceAnalysisTimeout("search query".to_string())),
            Ok(Err(error)) => {
                log_error(LogServiceType::Recognition, format!("Face analysis failed for search query, treating as zero faces: {:#}", error));
                vec![]
            }
            Ok(Ok(detected)) => detected,
        };

        let Some(query_embedding) = detected.iter().find_map(|f| f.embedding.clone()) else {
            return Ok(FaceSearchResult { person: None, scores: None, photos: vec![] });
        };

        let result = self.match_face(&user_id, &query_embedding).await?;
        match result.person {
            Some(person) => {
                let photos = self.store.get_photos_for_person(&person.id).await?;
                log_info(LogServiceType::Recognition, format!("Face search for user {} matched '{}' ({} photo(s))", user_id, person.name, photos.len()));
                Ok(FaceSearchResult { person: Some(person), scores: Some(result.scores), photos })
            }
            None => {
                log_info(LogServiceType::Recognition, format!("Face search for user {} found no matching person (best cosine distance: {:.4})", user_id, result.scores.cosine_distance));
                Ok(FaceSearchResult { person: None, scores: Some(result.scores), photos: vec![] })
            }
        }
    }

    pub async fn recognition_stats(&self, requesting_user: &ConnectedUser) -> SvResult<RecognitionStats> {
        let user_id = requesting_user.user_id()?;
        let (total_persons, auto_created_persons) = self.store.count_people(&user_id).await?;
        let total_faces_stored = self.store.count_faces(&user_id).await?;
        let total_photos = self.store.count_photos(&user_id).await?;
        Ok(RecognitionStats {
            total_persons,
            auto_created_persons,
            named_persons: total_persons - auto_created_persons,
            total_faces_stored,
            total_photos,
            model_pipeline: self.recognition.model_version.clone(),
            embedding_dimensions: EMBEDDING_DIM,
            matching_metric: "cosine".to_string(),
            cosine_threshold: self.recognition.cosine_threshold,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectFacesRequest {
    pub photo_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use crate::domain::face::FaceBBox;
    use crate::domain::photo::Photo;
    use crate::model::photos::PhotoForAdd;
    use crate::model::test_support::seed_user;
    use crate::server::RecognitionConfig;
    use crate::tools::face_inference::test_analyzer::{Script, ScriptedAnalyzer};
    use crate::tools::face_inference::DetectedFace;

    use super::*;

    fn init_test_dir() {
        static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
        let dir = DIR.get_or_init(|| tempfile::tempdir().expect("tempdir"));
        std::env::set_var("SNAPVAULT_DIR", dir.path());
    }

    fn face(embedding: Option<Vec<f32>>) -> DetectedFace {
        DetectedFace {
            embedding,
            bbox: FaceBBox { x: 1.0, y: 2.0, width: 30.0, height: 40.0 },
            confidence: 0.97,
            landmarks: Default::default(),
        }
    }

    // far apart in cosine distance
    fn emb_a() -> Vec<f32> {
        vec![1.0, 0.0, 0.0, 0.0]
    }
    fn emb_b() -> Vec<f32> {
        vec![0.0, 1.0, 0.0, 0.0]
    }
    fn emb_near_a() -> Vec<f32> {
        vec![1.0, 0.05, 0.0, 0.0]
    }

    async fn controller() -> (ModelController, Arc<ScriptedAnalyzer>) {
        init_test_dir();
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        let mc = ModelController::new_for_tests_with(analyzer.clone(), RecognitionConfig::default()).await.unwrap();
        (mc, analyzer)
    }

    async fn upload(mc: &ModelController, user: &ConnectedUser, name: &str, data: Vec<u8>) -> Photo {
        mc.upload_photo(PhotoForAdd { name: name.to_string(), mimetype: None }, data, user).await.unwrap()
    }

    #[tokio::test]
    async fn resolve_names_unknown_people_sequentially() {
        let (mc, _) = controller().await;
        let _user = seed_user(&mc, "u1").await;

        let first = mc.resolve_person("u1", &emb_a()).await.unwrap();
        assert_eq!(first.name, "Unknown Person 1");
        assert!(first.auto_created);

        let second = mc.resolve_person("u1", &emb_b()).await.unwrap();
        assert_eq!(second.name, "Unknown Person 2");
        assert!(second.auto_created);
    }

    #[tokio::test]
    async fn pipeline_matches_known_person_and_creates_unknown() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        // seed a known person with one stored embedding
        let alice = mc.add_person(crate::model::people::PersonForAdd { name: "Alice".to_string() }, &user).await.unwrap();
        let seed_photo = upload(&mc, &user, "seed.jpg", b"seed-image".to_vec()).await;
        mc.test_store().add_faces(vec![FaceRecord {
            id: "face-seed".to_string(),
            photo: seed_photo.id.clone(),
            person: alice.id.clone(),
            bbox: FaceBBox::default(),
            landmarks: Default::default(),
            confidence: 0.9,
            embedding: emb_a(),
            model_version: "test".to_string(),
            added: None,
        }]).await.unwrap();

        let data = b"two-faces-image".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![
            face(Some(emb_near_a())),
            face(Some(emb_b())),
        ]));
        let photo = upload(&mc, &user, "group.jpg", data).await;

        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].person, alice.id);
        assert_ne!(records[1].person, alice.id);

        // both records and the invented person are committed together
        let stored = mc.test_store().get_faces_for_photo(&photo.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        let unknown = mc.get_person(&records[1].person, &user).await.unwrap();
        assert!(unknown.auto_created);
        assert_eq!(unknown.name, "Unknown Person 1");
    }

    #[tokio::test]
    async fn same_stranger_twice_in_one_photo_creates_one_person() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"twins".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![
            face(Some(emb_a())),
            face(Some(emb_a())),
        ]));
        let photo = upload(&mc, &user, "twins.jpg", data).await;

        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].person, records[1].person);

        let stats = mc.recognition_stats(&user).await.unwrap();
        assert_eq!(stats.auto_created_persons, 1);
    }

    #[tokio::test]
    async fn face_without_embedding_is_skipped_not_fatal() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"partial".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![
            face(None),
            face(Some(emb_a())),
        ]));
        let photo = upload(&mc, &user, "partial.jpg", data).await;

        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn photo_without_faces_stores_nothing() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"landscape".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![]));
        let photo = upload(&mc, &user, "landscape.jpg", data).await;

        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        assert!(records.is_empty());
        assert!(mc.test_store().get_faces_for_photo(&photo.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyzer_throw_is_zero_faces_not_fatal() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"broken".to_vec();
        analyzer.script_for(&data, Script::Fail("model exploded".to_string()));
        let photo = upload(&mc, &user, "broken.jpg", data).await;

        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn missing_photo_file_is_a_retryable_failure() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"vanishing".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "vanishing.jpg", data).await;
        let path = mc.photo_path(&photo).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(mc.process_photo_faces(&photo.id, &user).await.is_err());
    }

    #[tokio::test]
    async fn hanging_analyzer_hits_the_timeout() {
        init_test_dir();
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        let recognition = RecognitionConfig { detection_timeout_secs: 0, ..Default::default() };
        let mc = ModelController::new_for_tests_with(analyzer.clone(), recognition).await.unwrap();
        let user = seed_user(&mc, "u1").await;

        let data = b"slow".to_vec();
        analyzer.script_for(&data, Script::Hang);
        let photo = upload(&mc, &user, "slow.jpg", data).await;

        let error = mc.process_photo_faces(&photo.id, &user).await.unwrap_err();
        assert!(matches!(error, SvError::FaceAnalysisTimeout(_)));
    }

    #[tokio::test]
    async fn batch_isolates_failures_per_photo() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let bad = b"bad-batch".to_vec();
        let good = b"good-batch".to_vec();
        analyzer.script_for(&good, Script::Faces(vec![face(Some(emb_a()))]));
        let bad_photo = upload(&mc, &user, "bad.jpg", bad).await;
        let good_photo = upload(&mc, &user, "good.jpg", good).await;
        // make the first photo's run fail hard: its file is gone
        let bad_path = mc.photo_path(&bad_photo).await.unwrap();
        tokio::fs::remove_file(&bad_path).await.unwrap();

        let results = mc.process_photos_batch(vec![bad_photo.id.clone(), good_photo.id.clone()], &user).await;
        assert_eq!(results.len(), 2);
        let bad_result = results.iter().find(|r| r.photo == bad_photo.id).unwrap();
        let good_result = results.iter().find(|r| r.photo == good_photo.id).unwrap();
        assert!(bad_result.faces.is_empty());
        assert_eq!(good_result.faces.len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_people_and_faces() {
        let (mc, _) = controller().await;
        let user = seed_user(&mc, "u1").await;
        let photo = upload(&mc, &user, "rollback.jpg", b"rollback".to_vec()).await;

        let pending_person = PersonForInsert {
            id: "pending-p".to_string(),
            user: "u1".to_string(),
            name: "Unknown Person 1".to_string(),
            auto_created: true,
        };
        let result = mc.test_store().add_faces_with_people(vec![pending_person], vec![
            FaceRecord {
                id: "f1".to_string(),
                photo: photo.id.clone(),
                person: "pending-p".to_string(),
                bbox: FaceBBox::default(),
                landmarks: Default::default(),
                confidence: 0.9,
                embedding: emb_a(),
                model_version: "test".to_string(),
                added: None,
            },
            FaceRecord {
                id: "f2".to_string(),
                photo: photo.id.clone(),
                person: "does-not-exist".to_string(),
                bbox: FaceBBox::default(),
                landmarks: Default::default(),
                confidence: 0.9,
                embedding: emb_b(),
                model_version: "test".to_string(),
                added: None,
            },
        ]).await;

        assert!(result.is_err());
        // full rollback: no faces and no invented person survive
        assert!(mc.test_store().get_faces_for_photo(&photo.id).await.unwrap().is_empty());
        assert!(mc.test_store().get_person("pending-p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_faces_show_up_in_next_match() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        // warm the cache while the user has no known faces
        assert!(mc.user_embeddings("u1").await.unwrap().is_empty());

        let data = b"stranger".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "stranger.jpg", data).await;
        mc.process_photo_faces(&photo.id, &user).await.unwrap();

        // the cache was invalidated on commit: the new face is visible now
        let embeddings = mc.user_embeddings("u1").await.unwrap();
        assert_eq!(embeddings.len(), 1);
        let rematch = mc.match_face("u1", &emb_near_a()).await.unwrap();
        assert!(rematch.person.is_some());
    }

    #[tokio::test]
    async fn search_finds_photos_of_matched_person() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"portrait".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "portrait.jpg", data).await;
        mc.process_photo_faces(&photo.id, &user).await.unwrap();

        let query = b"query-image".to_vec();
        analyzer.script_for(&query, Script::Faces(vec![face(Some(emb_near_a()))]));
        let found = mc.search_photos_by_face(query, &user).await.unwrap();
        assert!(found.person.is_some());
        assert_eq!(found.photos.len(), 1);
        assert_eq!(found.photos[0].id, photo.id);

        // closest-but-rejected diagnostics on a miss
        let far_query = b"far-query".to_vec();
        analyzer.script_for(&far_query, Script::Faces(vec![face(Some(emb_b()))]));
        let missed = mc.search_photos_by_face(far_query, &user).await.unwrap();
        assert!(missed.person.is_none());
        let scores = missed.scores.unwrap();
        assert!(scores.cosine_distance.is_finite());
        assert!(scores.cosine_distance >= mc.recognition.cosine_threshold);
    }

    #[tokio::test]
    async fn stats_report_counts_and_pipeline() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"stats-image".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "stats.jpg", data).await;
        mc.process_photo_faces(&photo.id, &user).await.unwrap();

        let stats = mc.recognition_stats(&user).await.unwrap();
        assert_eq!(stats.total_persons, 1);
        assert_eq!(stats.auto_created_persons, 1);
        assert_eq!(stats.named_persons, 0);
        assert_eq!(stats.total_faces_stored, 1);
        assert_eq!(stats.total_photos, 1);
        assert_eq!(stats.embedding_dimensions, EMBEDDING_DIM);
        assert_eq!(stats.matching_metric, "cosine");
    }

    #[tokio::test]
    async fn merging_people_moves_faces_and_refreshes_matches() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"merge-image".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "merge.jpg", data).await;
        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        let unknown_id = records[0].person.clone();

        let bob = mc.add_person(crate::model::people::PersonForAdd { name: "Bob".to_string() }, &user).await.unwrap();

        // warm the snapshot so a skipped invalidation would be visible
        let warmed = mc.match_face("u1", &emb_near_a()).await.unwrap();
        assert_eq!(warmed.person.unwrap().id, unknown_id);

        mc.merge_people(crate::model::people::PeopleMerge { source_person: unknown_id.clone(), target_person: bob.id.clone() }, &user).await.unwrap();

        let rematch = mc.match_face("u1", &emb_near_a()).await.unwrap();
        assert_eq!(rematch.person.unwrap().id, bob.id);
        assert!(mc.test_store().get_person(&unknown_id).await.unwrap().is_none());
        let bob_photos = mc.get_person_photos(&bob.id, &user).await.unwrap();
        assert_eq!(bob_photos.len(), 1);
    }

    #[tokio::test]
    async fn renaming_a_person_invalidates_the_snapshot() {
        let (mc, analyzer) = controller().await;
        let user = seed_user(&mc, "u1").await;

        let data = b"rename-image".to_vec();
        analyzer.script_for(&data, Script::Faces(vec![face(Some(emb_a()))]));
        let photo = upload(&mc, &user, "rename.jpg", data).await;
        let records = mc.process_photo_faces(&photo.id, &user).await.unwrap();
        let person_id = records[0].person.clone();

        // snapshot holds the auto-created name
        let before = mc.user_embeddings("u1").await.unwrap();
        assert_eq!(before[0].person.name, "Unknown Person 1");

        mc.update_person(&person_id, crate::model::people::PersonForUpdate { name: Some("Grandma".to_string()), auto_created: Some(false) }, &user).await.unwrap();

        // a stale cache would still say "Unknown Person 1" here
        let after = mc.user_embeddings("u1").await.unwrap();
        assert_eq!(after[0].person.name, "Grandma");
        assert!(!after[0].person.auto_created);
    }
}
