//! Remote entity and batch builders for reconciliation tests.

use notesync_model::{Guid, PermanentRoot, PERMANENT_ROOTS};
use notesync_protocol::{
    AttachmentSpecifics, ClientTagHash, EntityData, NoteSpecifics, PositionSuffix, ServerId,
    SpecialType, UniquePosition,
};

/// Builds the three permanent-root updates every initial batch carries.
#[must_use]
pub fn permanent_root_updates() -> Vec<EntityData> {
    PERMANENT_ROOTS
        .iter()
        .map(|root| EntityData {
            id: root_server_id(*root),
            parent_id: None,
            client_tag_hash: None,
            specifics: None,
            folder: true,
            unique_position: None,
            version: 1,
            deleted: false,
            deletion_origin: None,
            originator_cache_guid: None,
            originator_client_item_id: None,
            encryption_key_name: None,
            server_defined_unique_tag: Some(root.tag().to_string()),
        })
        .collect()
}

/// The conventional server id for a permanent root in tests.
#[must_use]
pub fn root_server_id(root: PermanentRoot) -> ServerId {
    ServerId::new(format!("root-{}", root.tag()))
}

/// Fluent builder for one remote update.
#[derive(Debug, Clone)]
pub struct RemoteEntityBuilder {
    id: ServerId,
    parent_id: Option<ServerId>,
    guid: Guid,
    omit_guid: bool,
    omit_client_tag: bool,
    legacy_title: bool,
    folder: bool,
    separator: bool,
    title: String,
    url: Option<String>,
    content: Option<String>,
    attachments: Vec<AttachmentSpecifics>,
    position: Option<UniquePosition>,
    version: i64,
    deleted: bool,
    creation_time_us: i64,
    originator_cache_guid: Option<String>,
    originator_client_item_id: Option<String>,
    encryption_key_name: Option<String>,
}

impl RemoteEntityBuilder {
    fn new(id: impl Into<String>, guid: Guid, title: impl Into<String>) -> Self {
        Self {
            id: ServerId::new(id),
            parent_id: None,
            guid,
            omit_guid: false,
            omit_client_tag: false,
            legacy_title: false,
            folder: false,
            separator: false,
            title: title.into(),
            url: None,
            content: None,
            attachments: Vec::new(),
            position: None,
            version: 1,
            deleted: false,
            creation_time_us: 0,
            originator_cache_guid: None,
            originator_client_item_id: None,
            encryption_key_name: None,
        }
    }

    /// Starts a note update.
    pub fn note(id: impl Into<String>, guid: Guid, title: impl Into<String>) -> Self {
        Self::new(id, guid, title)
    }

    /// Starts a folder update.
    pub fn folder(id: impl Into<String>, guid: Guid, title: impl Into<String>) -> Self {
        let mut builder = Self::new(id, guid, title);
        builder.folder = true;
        builder
    }

    /// Starts a separator update.
    pub fn separator(id: impl Into<String>, guid: Guid) -> Self {
        let mut builder = Self::new(id, guid, "");
        builder.separator = true;
        builder
    }

    /// Starts a tombstone update.
    pub fn tombstone(id: impl Into<String>, guid: Guid) -> Self {
        let mut builder = Self::new(id, guid, "");
        builder.deleted = true;
        builder
    }

    /// Parents the entity under a permanent root.
    #[must_use]
    pub fn under_root(mut self, root: PermanentRoot) -> Self {
        self.parent_id = Some(root_server_id(root));
        self
    }

    /// Parents the entity under another entity.
    #[must_use]
    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(ServerId::new(parent));
        self
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the content body.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Appends an attachment reference.
    #[must_use]
    pub fn with_attachment(mut self, checksum: impl Into<String>) -> Self {
        self.attachments.push(AttachmentSpecifics {
            checksum: checksum.into(),
        });
        self
    }

    /// Sets an explicit position.
    #[must_use]
    pub fn with_position(mut self, position: UniquePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the server version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_creation_time(mut self, creation_time_us: i64) -> Self {
        self.creation_time_us = creation_time_us;
        self
    }

    /// Sets the originator fields.
    #[must_use]
    pub fn with_originator(
        mut self,
        cache_guid: impl Into<String>,
        client_item_id: impl Into<String>,
    ) -> Self {
        self.originator_cache_guid = Some(cache_guid.into());
        self.originator_client_item_id = Some(client_item_id.into());
        self
    }

    /// Sets the encryption key name.
    #[must_use]
    pub fn with_encryption_key(mut self, name: impl Into<String>) -> Self {
        self.encryption_key_name = Some(name.into());
        self
    }

    /// Writes the title only into the legacy field, as pre-full-title
    /// clients did.
    #[must_use]
    pub fn with_legacy_title_encoding(mut self) -> Self {
        self.legacy_title = true;
        self
    }

    /// Omits the GUID from the specifics.
    #[must_use]
    pub fn without_specifics_guid(mut self) -> Self {
        self.omit_guid = true;
        self
    }

    /// Omits the client-tag hash from the entity.
    #[must_use]
    pub fn without_client_tag(mut self) -> Self {
        self.omit_client_tag = true;
        self
    }

    /// Builds the entity record.
    #[must_use]
    pub fn build(self) -> EntityData {
        let specifics = (!self.deleted).then(|| NoteSpecifics {
            guid: (!self.omit_guid).then_some(self.guid),
            parent_guid: None,
            title: self.title.clone(),
            full_title: (!self.legacy_title).then(|| self.title.clone()),
            url: self.url,
            content: self.content,
            attachments: self.attachments,
            creation_time_us: self.creation_time_us,
            special_type: if self.separator {
                SpecialType::Separator
            } else {
                SpecialType::Normal
            },
        });
        let position = if self.deleted {
            None
        } else {
            self.position.or_else(|| {
                Some(UniquePosition::new(
                    vec![0x80],
                    PositionSuffix::from_guid(&self.guid),
                ))
            })
        };
        EntityData {
            id: self.id,
            parent_id: self.parent_id,
            client_tag_hash: (!self.omit_client_tag)
                .then(|| ClientTagHash::from_guid(&self.guid)),
            specifics,
            folder: self.folder,
            unique_position: position,
            version: self.version,
            deleted: self.deleted,
            deletion_origin: None,
            originator_cache_guid: self.originator_cache_guid,
            originator_client_item_id: self.originator_client_item_id,
            encryption_key_name: self.encryption_key_name,
            server_defined_unique_tag: None,
        }
    }
}
