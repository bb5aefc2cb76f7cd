//! Run-time type information embedded in serialized files

use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::reader::EndianReader;

/// Shared string table referenced by type tree nodes whose string offset
/// has the high bit set. The engine links this table into every build, so
/// the offsets stay meaningful across files.
pub const COMMON_STRINGS: &[u8] = b"AABB\0AnimationClip\0AnimationCurve\0AnimationState\0\
Array\0Base\0BitField\0bitset\0bool\0char\0ColorRGBA\0Component\0data\0deque\0double\0\
dynamic_array\0FastPropertyName\0first\0float\0Font\0GameObject\0Generic Mono\0\
GradientNEW\0GUID\0GUIStyle\0int\0list\0long long\0map\0Matrix4x4f\0MdFour\0\
MonoBehaviour\0MonoScript\0m_Bones\0m_ByteSize\0m_Curve\0m_EditorClassIdentifier\0\
m_EditorHideFlags\0m_Enabled\0m_ExtensionPtr\0m_GameObject\0m_Index\0m_IsArray\0\
m_IsStatic\0m_MetaFlag\0m_Name\0m_ObjectHideFlags\0m_PrefabInternal\0\
m_PrefabParentObject\0m_Script\0m_StaticEditorFlags\0m_Type\0m_Version\0Object\0\
pair\0PPtr<Component>\0PPtr<GameObject>\0PPtr<Material>\0PPtr<MonoBehaviour>\0\
PPtr<MonoScript>\0PPtr<Object>\0PPtr<Prefab>\0PPtr<Sprite>\0PPtr<TextAsset>\0\
PPtr<Texture>\0PPtr<Texture2D>\0PPtr<Transform>\0Prefab\0Quaternionf\0Rectf\0\
RectInt\0RectOffset\0second\0set\0short\0size\0SInt16\0SInt32\0SInt64\0SInt8\0\
staticvector\0string\0TextAsset\0TextMesh\0Texture\0Texture2D\0Transform\0\
TypelessData\0UInt16\0UInt32\0UInt64\0UInt8\0unsigned int\0unsigned long long\0\
unsigned short\0vector\0Vector2f\0Vector3f\0Vector4f\0m_ScriptingClassIdentifier\0\
Gradient\0Type*\0int2_storage\0int3_storage\0BoundsInt\0m_CorrespondingSourceObject\0\
m_PrefabInstance\0m_PrefabAsset\0FileSize\0Hash128\0";

/// Metadata format version that introduced the flat blob node layout.
const VERSION_BLOB_FORMAT: u32 = 12;
/// Blob nodes grow a reference type hash from this version on.
const VERSION_REF_TYPE_HASH: u32 = 19;

const MAX_TYPE_STRING: usize = 1024;

/// One node of a type tree. Nodes form a tree through their `level` field;
/// the flat node order is the serialization order of the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTreeNode {
    pub version: u16,
    pub level: u8,
    pub type_flags: u8,
    pub type_name: String,
    pub name: String,
    pub byte_size: i32,
    pub index: i32,
    pub meta_flag: i32,
    pub ref_type_hash: Option<u64>,
}

/// A type's full field layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TypeTree {
    pub nodes: Vec<TypeTreeNode>,
}

impl TypeTree {
    /// Read a type tree, selecting the layout by metadata version.
    pub fn read(reader: &mut EndianReader<'_>, version: u32) -> Result<Self> {
        if version >= VERSION_BLOB_FORMAT || version == 10 {
            Self::read_blob(reader, version)
        } else {
            let mut nodes = Vec::new();
            read_legacy_node(reader, version, 0, &mut nodes)?;
            Ok(Self { nodes })
        }
    }

    /// Flat blob layout: node records first, then one shared string buffer.
    fn read_blob(reader: &mut EndianReader<'_>, version: u32) -> Result<Self> {
        let node_count = reader.read_i32()?;
        let string_buffer_size = reader.read_i32()?;
        if node_count < 0 || string_buffer_size < 0 {
            return Err(FilesError::invalid_data("negative type tree size"));
        }

        struct RawNode {
            version: u16,
            level: u8,
            type_flags: u8,
            type_str_offset: u32,
            name_str_offset: u32,
            byte_size: i32,
            index: i32,
            meta_flag: i32,
            ref_type_hash: Option<u64>,
        }

        let mut raw = Vec::with_capacity((node_count as usize).min(4096));
        for _ in 0..node_count {
            raw.push(RawNode {
                version: reader.read_u16()?,
                level: reader.read_u8()?,
                type_flags: reader.read_u8()?,
                type_str_offset: reader.read_u32()?,
                name_str_offset: reader.read_u32()?,
                byte_size: reader.read_i32()?,
                index: reader.read_i32()?,
                meta_flag: reader.read_i32()?,
                ref_type_hash: (version >= VERSION_REF_TYPE_HASH)
                    .then(|| reader.read_u64())
                    .transpose()?,
            });
        }
        let string_buffer = reader.read_bytes(string_buffer_size as usize)?;

        let mut nodes = Vec::with_capacity(raw.len());
        for node in raw {
            nodes.push(TypeTreeNode {
                version: node.version,
                level: node.level,
                type_flags: node.type_flags,
                type_name: resolve_string(&string_buffer, node.type_str_offset)?,
                name: resolve_string(&string_buffer, node.name_str_offset)?,
                byte_size: node.byte_size,
                index: node.index,
                meta_flag: node.meta_flag,
                ref_type_hash: node.ref_type_hash,
            });
        }
        Ok(Self { nodes })
    }
}

/// Legacy layout: each node stores its strings inline and its child count,
/// nesting recursively.
fn read_legacy_node(
    reader: &mut EndianReader<'_>,
    version: u32,
    level: u8,
    nodes: &mut Vec<TypeTreeNode>,
) -> Result<()> {
    if level > 64 {
        return Err(FilesError::invalid_data("type tree nested too deeply"));
    }
    let type_name = reader.read_cstring(MAX_TYPE_STRING)?;
    let name = reader.read_cstring(MAX_TYPE_STRING)?;
    let byte_size = reader.read_i32()?;
    if version == 2 {
        reader.skip(4)?; // variable count
    }
    let index = if version == 3 { -1 } else { reader.read_i32()? };
    let type_flags = reader.read_i32()?;
    let node_version = reader.read_i32()?;
    let meta_flag = if version == 3 { 0 } else { reader.read_i32()? };

    nodes.push(TypeTreeNode {
        version: node_version as u16,
        level,
        type_flags: type_flags as u8,
        type_name,
        name,
        byte_size,
        index,
        meta_flag,
        ref_type_hash: None,
    });

    let children = reader.read_i32()?;
    if children < 0 {
        return Err(FilesError::invalid_data("negative type tree child count"));
    }
    for _ in 0..children {
        read_legacy_node(reader, version, level + 1, nodes)?;
    }
    Ok(())
}

/// Look up a node string: plain offsets address the file's own buffer, the
/// high bit redirects into [`COMMON_STRINGS`].
fn resolve_string(local_buffer: &[u8], offset: u32) -> Result<String> {
    let (buffer, offset) = if offset & 0x8000_0000 != 0 {
        (COMMON_STRINGS, (offset & 0x7FFF_FFFF) as usize)
    } else {
        (local_buffer, offset as usize)
    };
    if offset >= buffer.len() {
        return Err(FilesError::invalid_data(format!(
            "type tree string offset {offset} outside buffer of {} bytes",
            buffer.len()
        )));
    }
    let terminator = buffer[offset..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| offset + p)
        .unwrap_or(buffer.len());
    Ok(std::str::from_utf8(&buffer[offset..terminator])?.to_string())
}
