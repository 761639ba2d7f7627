use docfs_chunk::{ChunkStore, UploadStream};
use docfs_lock::keys;
use docfs_store::{DocumentStore, Transaction, Update};
use docfs_types::{now, Element, ElementKind, MetadataValue, ObjectId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::debug;

use crate::elements::{ensure_kind, Elements};
use crate::error::{TreeError, TreeResult};
use crate::naming;
use crate::streams::{FileDownloadStream, FileUploadStream};

/// File operations. A file element shares its id with the chunk map that
/// holds its content.
pub struct Files<S> {
    elements: Elements<S>,
    chunks: ChunkStore<S>,
}

impl<S> Clone for Files<S> {
    fn clone(&self) -> Self {
        Self {
            elements: self.elements.clone(),
            chunks: self.chunks.clone(),
        }
    }
}

impl<S: DocumentStore> Files<S> {
    pub fn new(elements: Elements<S>, chunks: ChunkStore<S>) -> Self {
        Self { elements, chunks }
    }

    pub fn chunks(&self) -> &ChunkStore<S> {
        &self.chunks
    }

    pub fn elements(&self) -> &Elements<S> {
        &self.elements
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    pub async fn create(&self, parent_id: &ObjectId, name: &str, data: &[u8]) -> TreeResult<Element> {
        let mut stream = self.open_upload_stream(parent_id, name).await?;
        stream.write(data).await?;
        stream.close().await
    }

    pub async fn create_from_reader<R>(
        &self,
        parent_id: &ObjectId,
        name: &str,
        reader: &mut R,
    ) -> TreeResult<Element>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut stream = self.open_upload_stream(parent_id, name).await?;
        let mut buf = vec![0u8; self.chunks.config().buffer_length];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| TreeError::Chunk(e.into()))?;
            if n == 0 {
                break;
            }
            stream.write(&buf[..n]).await?;
        }
        stream.close().await
    }

    pub async fn open_upload_stream(
        &self,
        parent_id: &ObjectId,
        name: &str,
    ) -> TreeResult<FileUploadStream<S>> {
        naming::validate(name)?;
        self.elements.require_directory(parent_id).await?;
        let inner = self.chunks.open_upload(None).await?;
        Ok(FileUploadStream {
            files: self.clone(),
            parent_id: parent_id.clone(),
            name: name.to_string(),
            inner,
        })
    }

    /// Insert the element for a finished upload in the same transaction
    /// that makes its content visible.
    pub(crate) async fn commit_upload(
        &self,
        parent_id: &ObjectId,
        name: &str,
        upload: UploadStream<S>,
    ) -> TreeResult<Element> {
        let element = {
            let _children = self.elements.lock_children(parent_id).await;
            self.elements.require_directory(parent_id).await?;
            let taken = self.elements.taken_names(parent_id, None).await?;
            let name = naming::dedup(name, ElementKind::File, &taken);
            let element = Element::file(upload.id().clone(), parent_id.clone(), name, upload.len());
            let mut tx = Transaction::new();
            tx.insert(&element)?;
            upload.finish(tx).await?;
            element
        };
        self.elements.touch(parent_id).await?;
        debug!(id = %element.id, parent = %parent_id, name = %element.name, length = element.length(), "file created");
        Ok(element)
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// The file element `id`, removed or not.
    pub async fn get(&self, id: &ObjectId) -> TreeResult<Element> {
        let element = self.elements.require(id).await?;
        ensure_kind(&element, ElementKind::File)?;
        Ok(element)
    }

    pub async fn open_download_stream(&self, id: &ObjectId) -> TreeResult<FileDownloadStream<S>> {
        let element = self.elements.require_kind(id, ElementKind::File).await?;
        let inner = self.chunks.open_download(id).await?;
        Ok(FileDownloadStream {
            elements: self.elements.clone(),
            element,
            inner,
        })
    }

    /// Whole content of `id` plus its element after the access.
    pub async fn download(&self, id: &ObjectId) -> TreeResult<(Vec<u8>, Element)> {
        let mut stream = self.open_download_stream(id).await?;
        let bytes = stream.read_to_end().await?;
        let element = stream.close().await?;
        Ok((bytes, element))
    }

    pub async fn download_to<W>(&self, id: &ObjectId, writer: &mut W) -> TreeResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.elements.require_kind(id, ElementKind::File).await?;
        let n = self.chunks.download_to(id, writer).await?;
        self.elements.touch_opened(id).await?;
        Ok(n)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Replace the content of `id`, keeping its id, name and place. The new
    /// content and the element's length land in one commit, or neither does.
    pub async fn write(&self, id: &ObjectId, data: &[u8]) -> TreeResult<Element> {
        let _guard = self.elements.lock_element(id).await;
        self.elements.require_kind(id, ElementKind::File).await?;

        let length = data.len() as u64;
        let at = now();
        let mut tx = Transaction::new();
        tx.update(
            id,
            Update::set(move |e: &mut Element| {
                e.metadata.length = Some(length);
                e.modified = at;
                e.opened = at;
            }),
        );
        self.chunks.replace(id, data, tx).await?;
        debug!(id = %id, length, "file content replaced");
        self.elements.require(id).await
    }

    /// Soft delete, or with `permanently` drop the element and tombstone its
    /// content for collection.
    pub async fn remove(&self, id: &ObjectId, permanently: bool) -> TreeResult<()> {
        if !permanently {
            return self.elements.soft_remove(id, ElementKind::File).await;
        }
        let _guard = self.elements.lock_element(id).await;
        let Some(element) = self.elements.fetch(id).await? else {
            return Ok(());
        };
        ensure_kind(&element, ElementKind::File)?;
        let mut tx = Transaction::new();
        tx.delete::<Element>(id);
        self.chunks.remove_many(std::slice::from_ref(id), tx).await?;
        if let Some(parent) = &element.parent_id {
            self.elements.touch(parent).await?;
        }
        debug!(id = %id, "file deleted");
        Ok(())
    }

    pub async fn restore(&self, id: &ObjectId) -> TreeResult<Element> {
        self.elements.restore(id, ElementKind::File).await
    }

    /// Copy `id` with its content into `parent_id`.
    pub async fn copy(&self, id: &ObjectId, parent_id: &ObjectId) -> TreeResult<Element> {
        let source = {
            let _guard = self.elements.locks().acquire_reader(keys::element(id)).await;
            self.elements.require_kind(id, ElementKind::File).await?
        };
        self.elements.require_directory(parent_id).await?;
        let upload = self.chunks.duplicate_to(id).await?;

        let copy = {
            let _children = self.elements.lock_children(parent_id).await;
            self.elements.require_directory(parent_id).await?;
            let taken = self.elements.taken_names(parent_id, None).await?;
            let name = naming::copy_name(&source.name, &taken);
            let mut copy = Element::file(upload.id().clone(), parent_id.clone(), name, upload.len());
            copy.metadata = source.metadata.clone();
            copy.metadata.clear_deletion();
            copy.metadata.length = Some(upload.len());
            copy.custom_metadata = source.custom_metadata.clone();
            let mut tx = Transaction::new();
            tx.insert(&copy)?;
            upload.finish(tx).await?;
            copy
        };
        self.elements.touch(parent_id).await?;
        self.elements.touch_opened(id).await?;
        debug!(source = %id, copy = %copy.id, name = %copy.name, "file copied");
        Ok(copy)
    }

    pub async fn move_to(&self, id: &ObjectId, new_parent_id: &ObjectId) -> TreeResult<Element> {
        let _guard = self.elements.lock_element(id).await;
        let element = self.elements.require_kind(id, ElementKind::File).await?;
        if element.parent_id.as_ref() == Some(new_parent_id) {
            self.elements.require_directory(new_parent_id).await?;
            return self.elements.touch_opened(id).await;
        }
        self.elements.reparent(&element, new_parent_id).await
    }

    pub async fn rename(&self, id: &ObjectId, new_name: &str) -> TreeResult<Element> {
        self.elements.rename(id, new_name, ElementKind::File).await
    }

    pub async fn set_custom_metadata(
        &self,
        id: &ObjectId,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> TreeResult<Element> {
        self.elements
            .set_custom_metadata(id, ElementKind::File, key, value.into())
            .await
    }

    pub async fn remove_custom_metadata(&self, id: &ObjectId, key: &str) -> TreeResult<Element> {
        self.elements
            .remove_custom_metadata(id, ElementKind::File, key)
            .await
    }
}
