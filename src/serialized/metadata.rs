//! Serialized file metadata: types, objects, script types and externals

use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::reader::{ByteOrder, EndianReader};
use crate::serialized::header::SerializedFileHeader;
use crate::serialized::typetree::TypeTree;

const VERSION_HAS_USER_INFORMATION: u32 = 5;
const VERSION_HAS_EXTERNAL_GUID: u32 = 5;
const VERSION_HAS_EXTERNAL_ASSET_PATH: u32 = 6;
const VERSION_HAS_UNITY_VERSION: u32 = 7;
const VERSION_HAS_PLATFORM: u32 = 8;
const VERSION_HAS_SCRIPT_TYPES: u32 = 11;
const VERSION_HAS_TYPE_TREE_FLAG: u32 = 13;
const VERSION_LONG_OBJECT_IDS: u32 = 14;
const VERSION_TYPE_INDEX_OBJECTS: u32 = 16;
const VERSION_TYPE_SCRIPT_INDEX: u32 = 17;
const VERSION_HAS_REF_TYPES: u32 = 20;
const VERSION_HAS_TYPE_DEPENDENCIES: u32 = 21;
const VERSION_LARGE_OBJECT_OFFSETS: u32 = 22;

const MAX_METADATA_STRING: usize = 1024;
const MONO_BEHAVIOUR_CLASS_ID: i32 = 114;

/// A type record from the metadata's type list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    pub script_type_index: i16,
    /// Hash of the backing script, present for script-driven types
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: Option<[u8; 16]>,
    pub tree: Option<TypeTree>,
    /// For regular types from version 21: indices of referenced types
    pub type_dependencies: Vec<i32>,
    /// For reference types from version 21: the fully qualified class
    pub class_name: Option<String>,
    pub namespace: Option<String>,
    pub assembly_name: Option<String>,
}

impl SerializedType {
    fn read(
        reader: &mut EndianReader<'_>,
        version: u32,
        enable_type_tree: bool,
        is_ref_type: bool,
    ) -> Result<Self> {
        let class_id = reader.read_i32()?;
        let is_stripped = if version >= VERSION_TYPE_INDEX_OBJECTS {
            reader.read_bool()?
        } else {
            false
        };
        let script_type_index = if version >= VERSION_TYPE_SCRIPT_INDEX {
            reader.read_i16()?
        } else {
            -1
        };

        let mut script_id = None;
        let mut old_type_hash = None;
        if version >= VERSION_HAS_TYPE_TREE_FLAG {
            let scripted = if version < VERSION_TYPE_INDEX_OBJECTS {
                class_id < 0
            } else {
                class_id == MONO_BEHAVIOUR_CLASS_ID
            };
            if scripted {
                script_id = Some(reader.read_byte_array::<16>()?);
            }
            old_type_hash = Some(reader.read_byte_array::<16>()?);
        }

        let mut tree = None;
        let mut type_dependencies = Vec::new();
        let mut class_name = None;
        let mut namespace = None;
        let mut assembly_name = None;
        if enable_type_tree {
            tree = Some(TypeTree::read(reader, version)?);
            if version >= VERSION_HAS_TYPE_DEPENDENCIES {
                if is_ref_type {
                    class_name = Some(reader.read_cstring(MAX_METADATA_STRING)?);
                    namespace = Some(reader.read_cstring(MAX_METADATA_STRING)?);
                    assembly_name = Some(reader.read_cstring(MAX_METADATA_STRING)?);
                } else {
                    type_dependencies = reader.read_i32_array()?;
                }
            }
        }

        Ok(Self {
            class_id,
            is_stripped,
            script_type_index,
            script_id,
            old_type_hash,
            tree,
            type_dependencies,
            class_name,
            namespace,
            assembly_name,
        })
    }
}

/// One entry of the object table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// The object's identifier, unique within the file
    pub file_id: i64,
    /// Offset of the object's bytes, relative to the header's data offset
    pub byte_start: u64,
    pub byte_size: u32,
    /// Index into the type list (version 16 and later) or the raw type id
    pub type_id: i32,
    /// Resolved class identifier
    pub class_id: i32,
    pub script_type_index: i16,
    pub is_stripped: bool,
}

impl ObjectInfo {
    fn read(reader: &mut EndianReader<'_>, version: u32, big_ids: bool) -> Result<Self> {
        let file_id = if version >= VERSION_LONG_OBJECT_IDS {
            reader.align()?;
            reader.read_i64()?
        } else if big_ids {
            reader.read_i64()?
        } else {
            reader.read_i32()? as i64
        };

        let byte_start = if version >= VERSION_LARGE_OBJECT_OFFSETS {
            let start = reader.read_i64()?;
            if start < 0 {
                return Err(FilesError::invalid_data(format!(
                    "object {file_id} has negative byte start"
                )));
            }
            start as u64
        } else {
            reader.read_u32()? as u64
        };
        let byte_size = reader.read_u32()?;
        let type_id = reader.read_i32()?;

        let mut class_id = type_id;
        let mut script_type_index = -1;
        let mut is_stripped = false;
        if version < VERSION_TYPE_INDEX_OBJECTS {
            class_id = reader.read_i16()? as i32;
            if version < VERSION_HAS_SCRIPT_TYPES {
                reader.skip(2)?; // destroyed marker
            }
            if (VERSION_HAS_SCRIPT_TYPES..VERSION_TYPE_SCRIPT_INDEX).contains(&version) {
                script_type_index = reader.read_i16()?;
            }
        }
        if version == 15 || version == 16 {
            is_stripped = reader.read_bool()?;
        }

        Ok(Self {
            file_id,
            byte_start,
            byte_size,
            type_id,
            class_id,
            script_type_index,
            is_stripped,
        })
    }
}

/// Pointer to a script object in this or another serialized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptIdentifier {
    pub file_index: i32,
    pub identifier_in_file: i64,
}

impl ScriptIdentifier {
    fn read(reader: &mut EndianReader<'_>, version: u32) -> Result<Self> {
        let file_index = reader.read_i32()?;
        let identifier_in_file = if version >= VERSION_LONG_OBJECT_IDS {
            reader.align()?;
            reader.read_i64()?
        } else {
            reader.read_i32()? as i64
        };
        Ok(Self {
            file_index,
            identifier_in_file,
        })
    }
}

/// A dependency on another file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentifier {
    pub asset_path: String,
    pub guid: [u8; 16],
    pub file_type: i32,
    pub path: String,
}

impl FileIdentifier {
    fn read(reader: &mut EndianReader<'_>, version: u32) -> Result<Self> {
        let asset_path = if version >= VERSION_HAS_EXTERNAL_ASSET_PATH {
            reader.read_cstring(MAX_METADATA_STRING)?
        } else {
            String::new()
        };
        let (guid, file_type) = if version >= VERSION_HAS_EXTERNAL_GUID {
            (reader.read_byte_array::<16>()?, reader.read_i32()?)
        } else {
            ([0; 16], 0)
        };
        let path = reader.read_cstring(MAX_METADATA_STRING)?;
        Ok(Self {
            asset_path,
            guid,
            file_type,
            path,
        })
    }

    /// The dependency's file name, with any directory part stripped.
    pub fn name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// The whole metadata section of a serialized file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedFileMetadata {
    pub endianness: ByteOrder,
    pub unity_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    pub big_id_enabled: bool,
    pub objects: Vec<ObjectInfo>,
    pub script_types: Vec<ScriptIdentifier>,
    pub externals: Vec<FileIdentifier>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
}

impl SerializedFileMetadata {
    /// Read the metadata section from the reader's current position.
    ///
    /// The reader must be big-endian on entry; the metadata's own
    /// endianness is resolved from the header or, before version 9, from
    /// the leading swap byte.
    pub fn read(reader: &mut EndianReader<'_>, header: &SerializedFileHeader) -> Result<Self> {
        let version = header.version;
        let endianness = match header.endianness {
            Some(endianness) => endianness,
            None => {
                if reader.read_bool()? {
                    ByteOrder::Big
                } else {
                    ByteOrder::Little
                }
            }
        };
        reader.set_byte_order(endianness);

        let unity_version = if version >= VERSION_HAS_UNITY_VERSION {
            reader.read_cstring(MAX_METADATA_STRING)?
        } else {
            String::new()
        };
        let target_platform = if version >= VERSION_HAS_PLATFORM {
            reader.read_i32()?
        } else {
            0
        };
        let enable_type_tree = if version >= VERSION_HAS_TYPE_TREE_FLAG {
            reader.read_bool()?
        } else {
            true
        };

        let type_count = read_count(reader)?;
        let mut types = Vec::with_capacity(type_count.min(4096));
        for _ in 0..type_count {
            types.push(SerializedType::read(reader, version, enable_type_tree, false)?);
        }

        let big_id_enabled = if (VERSION_HAS_UNITY_VERSION..VERSION_LONG_OBJECT_IDS)
            .contains(&version)
        {
            reader.read_i32()? != 0
        } else {
            false
        };

        let object_count = read_count(reader)?;
        let mut objects = Vec::with_capacity(object_count.min(65536));
        for _ in 0..object_count {
            let mut object = ObjectInfo::read(reader, version, big_id_enabled)?;
            if version >= VERSION_TYPE_INDEX_OBJECTS {
                let Some(ty) = types.get(object.type_id as usize) else {
                    return Err(FilesError::invalid_data(format!(
                        "object {} references type {} of {}",
                        object.file_id,
                        object.type_id,
                        types.len()
                    )));
                };
                object.class_id = ty.class_id;
                object.script_type_index = ty.script_type_index;
            }
            objects.push(object);
        }

        let mut script_types = Vec::new();
        if version >= VERSION_HAS_SCRIPT_TYPES {
            let count = read_count(reader)?;
            for _ in 0..count {
                script_types.push(ScriptIdentifier::read(reader, version)?);
            }
        }

        let external_count = read_count(reader)?;
        let mut externals = Vec::with_capacity(external_count.min(4096));
        for _ in 0..external_count {
            externals.push(FileIdentifier::read(reader, version)?);
        }

        let mut ref_types = Vec::new();
        if version >= VERSION_HAS_REF_TYPES {
            let count = read_count(reader)?;
            for _ in 0..count {
                ref_types.push(SerializedType::read(reader, version, enable_type_tree, true)?);
            }
        }

        let user_information = if version >= VERSION_HAS_USER_INFORMATION {
            reader.read_cstring(MAX_METADATA_STRING)?
        } else {
            String::new()
        };

        Ok(Self {
            endianness,
            unity_version,
            target_platform,
            enable_type_tree,
            types,
            big_id_enabled,
            objects,
            script_types,
            externals,
            ref_types,
            user_information,
        })
    }
}

fn read_count(reader: &mut EndianReader<'_>) -> Result<usize> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(FilesError::invalid_data(format!(
            "negative metadata count {count}"
        )));
    }
    Ok(count as usize)
}
