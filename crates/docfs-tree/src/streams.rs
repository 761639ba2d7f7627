use std::io::SeekFrom;

use docfs_chunk::{DownloadStream, UploadStream};
use docfs_store::DocumentStore;
use docfs_types::{Element, ObjectId};

use crate::elements::Elements;
use crate::error::{TreeError, TreeResult};
use crate::files::Files;

/// Writer for a new file. The file element appears only when the stream is
/// closed; dropping it discards the upload.
pub struct FileUploadStream<S: DocumentStore> {
    pub(crate) files: Files<S>,
    pub(crate) parent_id: ObjectId,
    pub(crate) name: String,
    pub(crate) inner: UploadStream<S>,
}

impl<S: DocumentStore> FileUploadStream<S> {
    /// Id the file will have once closed.
    pub fn id(&self) -> &ObjectId {
        self.inner.id()
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub async fn write(&mut self, data: &[u8]) -> TreeResult<()> {
        Ok(self.inner.write(data).await?)
    }

    /// Persist the remaining bytes and insert the file element.
    pub async fn close(self) -> TreeResult<Element> {
        let Self {
            files,
            parent_id,
            name,
            inner,
        } = self;
        files.commit_upload(&parent_id, &name, inner).await
    }
}

/// Seekable reader over a file's content.
pub struct FileDownloadStream<S: DocumentStore> {
    pub(crate) elements: Elements<S>,
    pub(crate) element: Element,
    pub(crate) inner: DownloadStream<S>,
}

impl<S: DocumentStore> FileDownloadStream<S> {
    /// The file element as it was when the stream was opened.
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn id(&self) -> &ObjectId {
        &self.element.id
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> TreeResult<u64> {
        Ok(self.inner.seek(pos).await?)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> TreeResult<usize> {
        Ok(self.inner.read(buf).await?)
    }

    pub async fn read_to_end(&mut self) -> TreeResult<Vec<u8>> {
        Ok(self.inner.read_to_end().await?)
    }

    /// Release the content and record the access on the element.
    pub async fn close(self) -> TreeResult<Element> {
        let Self {
            elements,
            element,
            inner,
        } = self;
        inner.close().await?;
        match elements.touch_opened(&element.id).await {
            Ok(touched) => Ok(touched),
            Err(TreeError::NotFound(_)) => Ok(element),
            Err(e) => Err(e),
        }
    }
}
