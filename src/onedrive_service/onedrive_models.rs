use serde::{Deserialize, Serialize};

/// ParentReference: Represents the parent reference of a drive item.
/// The path is the API-rooted path of the parent, e.g. `/drive/root:/Documents`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct ParentReference {
    #[serde(default)]
    pub id: String,
    pub path: Option<String>,
}

/// DriveItem: a file or folder descriptor as returned by the Graph API.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DriveItem {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "lastModifiedDateTime")]
    pub last_modified: Option<String>,
    pub size: Option<u64>,
    pub folder: Option<FolderFacet>,
    pub file: Option<FileFacet>,
    #[serde(rename = "parentReference")]
    pub parent_reference: Option<ParentReference>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.file.is_none()
    }
}

/// FolderFacet: Represents the folder facet of a drive item.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct FolderFacet {
    #[serde(rename = "childCount", default)]
    pub child_count: u32,
}

/// FileFacet: Represents the file facet of a drive item.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct FileFacet {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// DriveItemCollection: one page of a children listing.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct DriveItemCollection {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Body of a create-folder request.
#[derive(Debug, Serialize)]
pub struct NewFolderRequest {
    pub name: String,
    pub folder: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: String,
}

impl NewFolderRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            folder: serde_json::Map::new(),
            conflict_behavior: "fail".to_string(),
        }
    }
}
