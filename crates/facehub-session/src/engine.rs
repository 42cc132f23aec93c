//! Async front end for a [`SessionContext`].
//!
//! The session is moved onto a dedicated OS thread and driven through a
//! bounded request channel, so every call against one session is serialized
//! and async callers never block the runtime on model inference.

use crate::cache::{AttributeCache, TrackingCache};
use crate::config::DetectMode;
use crate::context::SessionContext;
use crate::error::SessionError;
use facehub_core::{Embedding, FaceRecord, FaceRecordBytes, FeatureRecord, Frame, PipelineParams, SearchResult};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const REQUEST_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("session thread exited")]
    ChannelClosed,
    #[error("failed to spawn session thread: {0}")]
    Spawn(#[source] std::io::Error),
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Messages sent from async callers to the session thread.
enum SessionRequest {
    DetectAndTrack {
        frame: Frame,
        reply: Reply<TrackingCache>,
    },
    FacesProcess {
        frame: Frame,
        faces: Vec<FaceRecord>,
        params: PipelineParams,
        reply: Reply<AttributeCache>,
    },
    Extract {
        frame: Frame,
        record: FaceRecordBytes,
        reply: Reply<Embedding>,
    },
    Search {
        query: Embedding,
        reply: Reply<SearchResult>,
    },
    Insert {
        embedding: Embedding,
        tag: String,
        custom_id: i32,
        reply: Reply<i32>,
    },
    Update {
        embedding: Embedding,
        tag: String,
        custom_id: i32,
        reply: Reply<()>,
    },
    Remove {
        custom_id: i32,
        reply: Reply<()>,
    },
    Get {
        custom_id: i32,
        reply: Reply<FeatureRecord>,
    },
    SetDetectMode {
        mode: DetectMode,
        reply: Reply<()>,
    },
    SetRecognitionThreshold {
        threshold: f32,
        reply: Reply<()>,
    },
    FeatureCount {
        reply: Reply<usize>,
    },
}

impl SessionRequest {
    fn handle(self, session: &mut SessionContext) {
        match self {
            SessionRequest::DetectAndTrack { frame, reply } => {
                let result = session
                    .detect_and_track(&frame)
                    .map(|_| session.tracking().clone());
                let _ = reply.send(result);
            }
            SessionRequest::FacesProcess {
                frame,
                faces,
                params,
                reply,
            } => {
                let result = session
                    .faces_process(&frame, &faces, &params)
                    .map(|()| session.attributes().clone());
                let _ = reply.send(result);
            }
            SessionRequest::Extract { frame, record, reply } => {
                let result = session
                    .face_feature_extract(&frame, record.as_bytes())
                    .map(Embedding::clone);
                let _ = reply.send(result);
            }
            SessionRequest::Search { query, reply } => {
                let _ = reply.send(session.search_face_feature(&query));
            }
            SessionRequest::Insert {
                embedding,
                tag,
                custom_id,
                reply,
            } => {
                let _ = reply.send(session.insert_feature(&embedding, &tag, custom_id));
            }
            SessionRequest::Update {
                embedding,
                tag,
                custom_id,
                reply,
            } => {
                let _ = reply.send(session.update_feature(&embedding, &tag, custom_id));
            }
            SessionRequest::Remove { custom_id, reply } => {
                let _ = reply.send(session.remove_feature(custom_id));
            }
            SessionRequest::Get { custom_id, reply } => {
                let result = session.get_feature(custom_id).map(|view| FeatureRecord {
                    custom_id: view.custom_id,
                    tag: view.tag.to_string_lossy().into_owned(),
                    embedding: view.embedding.clone(),
                });
                let _ = reply.send(result);
            }
            SessionRequest::SetDetectMode { mode, reply } => {
                session.set_detect_mode(mode);
                let _ = reply.send(Ok(()));
            }
            SessionRequest::SetRecognitionThreshold { threshold, reply } => {
                let _ = reply.send(session.set_recognition_threshold(threshold));
            }
            SessionRequest::FeatureCount { reply } => {
                let _ = reply.send(Ok(session.feature_count()));
            }
        }
    }
}

/// Clone-safe handle to a session thread. The thread exits once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SessionHandle {
    /// Move `session` onto its own thread and return a handle to it.
    pub fn spawn(mut session: SessionContext) -> Result<Self, HandleError> {
        let (tx, mut rx) = mpsc::channel::<SessionRequest>(REQUEST_QUEUE_DEPTH);

        std::thread::Builder::new()
            .name("facehub-session".into())
            .spawn(move || {
                tracing::info!("session thread started");
                while let Some(req) = rx.blocking_recv() {
                    req.handle(&mut session);
                }
                tracing::info!("session thread exiting");
            })
            .map_err(HandleError::Spawn)?;

        Ok(Self { tx })
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> SessionRequest) -> Result<T, HandleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| HandleError::ChannelClosed)?;
        let result = reply_rx.await.map_err(|_| HandleError::ChannelClosed)?;
        Ok(result?)
    }

    /// Track faces in `frame`; returns a snapshot of the new tracking cache.
    pub async fn detect_and_track(&self, frame: Frame) -> Result<TrackingCache, HandleError> {
        self.call(|reply| SessionRequest::DetectAndTrack { frame, reply }).await
    }

    pub async fn faces_process(
        &self,
        frame: Frame,
        faces: Vec<FaceRecord>,
        params: PipelineParams,
    ) -> Result<AttributeCache, HandleError> {
        self.call(|reply| SessionRequest::FacesProcess {
            frame,
            faces,
            params,
            reply,
        })
        .await
    }

    pub async fn face_feature_extract(&self, frame: Frame, record: FaceRecordBytes) -> Result<Embedding, HandleError> {
        self.call(|reply| SessionRequest::Extract { frame, record, reply }).await
    }

    pub async fn search_face_feature(&self, query: Embedding) -> Result<SearchResult, HandleError> {
        self.call(|reply| SessionRequest::Search { query, reply }).await
    }

    /// Returns the id the record is stored under.
    pub async fn insert_feature(&self, embedding: Embedding, tag: String, custom_id: i32) -> Result<i32, HandleError> {
        self.call(|reply| SessionRequest::Insert {
            embedding,
            tag,
            custom_id,
            reply,
        })
        .await
    }

    pub async fn update_feature(&self, embedding: Embedding, tag: String, custom_id: i32) -> Result<(), HandleError> {
        self.call(|reply| SessionRequest::Update {
            embedding,
            tag,
            custom_id,
            reply,
        })
        .await
    }

    pub async fn remove_feature(&self, custom_id: i32) -> Result<(), HandleError> {
        self.call(|reply| SessionRequest::Remove { custom_id, reply }).await
    }

    /// Fetch a gallery record. The tag is the bounded output-slot copy.
    pub async fn get_feature(&self, custom_id: i32) -> Result<FeatureRecord, HandleError> {
        self.call(|reply| SessionRequest::Get { custom_id, reply }).await
    }

    pub async fn set_detect_mode(&self, mode: DetectMode) -> Result<(), HandleError> {
        self.call(|reply| SessionRequest::SetDetectMode { mode, reply }).await
    }

    pub async fn set_recognition_threshold(&self, threshold: f32) -> Result<(), HandleError> {
        self.call(|reply| SessionRequest::SetRecognitionThreshold { threshold, reply })
            .await
    }

    pub async fn feature_count(&self) -> Result<usize, HandleError> {
        self.call(|reply| SessionRequest::FeatureCount { reply }).await
    }
}
