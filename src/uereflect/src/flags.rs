//! Engine flag sets read from target memory

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Type-tag bits stored on UClass and FFieldClass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CastFlags: u64 {
        const FIELD = 0x1;
        const INT8_PROPERTY = 0x2;
        const ENUM = 0x4;
        const STRUCT = 0x8;
        const SCRIPT_STRUCT = 0x10;
        const CLASS = 0x20;
        const BYTE_PROPERTY = 0x40;
        const INT_PROPERTY = 0x80;
        const FLOAT_PROPERTY = 0x100;
        const UINT64_PROPERTY = 0x200;
        const CLASS_PROPERTY = 0x400;
        const UINT32_PROPERTY = 0x800;
        const INTERFACE_PROPERTY = 0x1000;
        const NAME_PROPERTY = 0x2000;
        const STR_PROPERTY = 0x4000;
        const PROPERTY = 0x8000;
        const OBJECT_PROPERTY = 0x10000;
        const BOOL_PROPERTY = 0x20000;
        const UINT16_PROPERTY = 0x40000;
        const FUNCTION = 0x80000;
        const STRUCT_PROPERTY = 0x100000;
        const ARRAY_PROPERTY = 0x200000;
        const INT64_PROPERTY = 0x400000;
        const DELEGATE_PROPERTY = 0x800000;
        const NUMERIC_PROPERTY = 0x1000000;
        const MULTICAST_DELEGATE_PROPERTY = 0x2000000;
        const OBJECT_PROPERTY_BASE = 0x4000000;
        const WEAK_OBJECT_PROPERTY = 0x8000000;
        const LAZY_OBJECT_PROPERTY = 0x10000000;
        const SOFT_OBJECT_PROPERTY = 0x20000000;
        const TEXT_PROPERTY = 0x40000000;
        const INT16_PROPERTY = 0x80000000;
        const DOUBLE_PROPERTY = 1 << 32;
        const SOFT_CLASS_PROPERTY = 1 << 33;
        const PACKAGE = 1 << 34;
        const LEVEL = 1 << 35;
        const ACTOR = 1 << 36;
        const PLAYER_CONTROLLER = 1 << 37;
        const PAWN = 1 << 38;
        const SCENE_COMPONENT = 1 << 39;
        const PRIMITIVE_COMPONENT = 1 << 40;
        const SKINNED_MESH_COMPONENT = 1 << 41;
        const SKELETAL_MESH_COMPONENT = 1 << 42;
        const BLUEPRINT = 1 << 43;
        const DELEGATE_FUNCTION = 1 << 44;
        const STATIC_MESH_COMPONENT = 1 << 45;
        const MAP_PROPERTY = 1 << 46;
        const SET_PROPERTY = 1 << 47;
        const ENUM_PROPERTY = 1 << 48;
        const SPARSE_DELEGATE_FUNCTION = 1 << 49;
        const MULTICAST_INLINE_DELEGATE_PROPERTY = 1 << 50;
        const MULTICAST_SPARSE_DELEGATE_PROPERTY = 1 << 51;
        const FIELD_PATH_PROPERTY = 1 << 52;
        const LARGE_WORLD_COORDINATES_REAL_PROPERTY = 1 << 55;
        const OPTIONAL_PROPERTY = 1 << 56;
    }
}

bitflags! {
    /// UFunction::FunctionFlags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FunctionFlags: u32 {
        const FINAL = 0x1;
        const REQUIRED_API = 0x2;
        const BLUEPRINT_AUTHORITY_ONLY = 0x4;
        const BLUEPRINT_COSMETIC = 0x8;
        const NET = 0x40;
        const NET_RELIABLE = 0x80;
        const NET_REQUEST = 0x100;
        const EXEC = 0x200;
        const NATIVE = 0x400;
        const EVENT = 0x800;
        const NET_RESPONSE = 0x1000;
        const STATIC = 0x2000;
        const NET_MULTICAST = 0x4000;
        const UBERGRAPH_FUNCTION = 0x8000;
        const MULTICAST_DELEGATE = 0x10000;
        const PUBLIC = 0x20000;
        const PRIVATE = 0x40000;
        const PROTECTED = 0x80000;
        const DELEGATE = 0x100000;
        const NET_SERVER = 0x200000;
        const HAS_OUT_PARMS = 0x400000;
        const HAS_DEFAULTS = 0x800000;
        const NET_CLIENT = 0x1000000;
        const DLL_IMPORT = 0x2000000;
        const BLUEPRINT_CALLABLE = 0x4000000;
        const BLUEPRINT_EVENT = 0x8000000;
        const BLUEPRINT_PURE = 0x10000000;
        const EDITOR_ONLY = 0x20000000;
        const CONST = 0x40000000;
        const NET_VALIDATE = 0x80000000;
    }
}

bitflags! {
    /// Property::PropertyFlags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PropertyFlags: u64 {
        const EDIT = 0x1;
        const CONST_PARM = 0x2;
        const BLUEPRINT_VISIBLE = 0x4;
        const EXPORT_OBJECT = 0x8;
        const BLUEPRINT_READ_ONLY = 0x10;
        const NET = 0x20;
        const EDIT_FIXED_SIZE = 0x40;
        const PARM = 0x80;
        const OUT_PARM = 0x100;
        const ZERO_CONSTRUCTOR = 0x200;
        const RETURN_PARM = 0x400;
        const DISABLE_EDIT_ON_TEMPLATE = 0x800;
        const TRANSIENT = 0x2000;
        const CONFIG = 0x4000;
        const DISABLE_EDIT_ON_INSTANCE = 0x10000;
        const EDIT_CONST = 0x20000;
        const GLOBAL_CONFIG = 0x40000;
        const INSTANCED_REFERENCE = 0x80000;
        const DUPLICATE_TRANSIENT = 0x200000;
        const SAVE_GAME = 0x1000000;
        const NO_CLEAR = 0x2000000;
        const REFERENCE_PARM = 0x8000000;
        const BLUEPRINT_ASSIGNABLE = 0x10000000;
        const DEPRECATED = 0x20000000;
        const IS_PLAIN_OLD_DATA = 0x40000000;
        const REP_SKIP = 0x80000000;
        const REP_NOTIFY = 0x100000000;
        const INTERP = 0x200000000;
        const NON_TRANSACTIONAL = 0x400000000;
        const EDITOR_ONLY = 0x800000000;
        const NO_DESTRUCTOR = 0x1000000000;
        const AUTO_WEAK = 0x4000000000;
        const CONTAINS_INSTANCED_REFERENCE = 0x8000000000;
        const ASSET_REGISTRY_SEARCHABLE = 0x10000000000;
        const SIMPLE_DISPLAY = 0x20000000000;
        const ADVANCED_DISPLAY = 0x40000000000;
        const PROTECTED = 0x80000000000;
        const BLUEPRINT_CALLABLE = 0x100000000000;
        const BLUEPRINT_AUTHORITY_ONLY = 0x200000000000;
        const TEXT_EXPORT_TRANSIENT = 0x400000000000;
        const NON_PIE_DUPLICATE_TRANSIENT = 0x800000000000;
        const EXPOSE_ON_SPAWN = 0x1000000000000;
        const PERSISTENT_INSTANCE = 0x2000000000000;
        const UOBJECT_WRAPPER = 0x4000000000000;
        const HAS_GET_VALUE_TYPE_HASH = 0x8000000000000;
        const NATIVE_ACCESS_SPECIFIER_PUBLIC = 0x10000000000000;
        const NATIVE_ACCESS_SPECIFIER_PROTECTED = 0x20000000000000;
        const NATIVE_ACCESS_SPECIFIER_PRIVATE = 0x40000000000000;
        const SKIP_SERIALIZATION = 0x80000000000000;
    }
}

bitflags! {
    /// UObject::ObjectFlags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ObjectFlags: u32 {
        const PUBLIC = 0x1;
        const STANDALONE = 0x2;
        const MARK_AS_NATIVE = 0x4;
        const TRANSACTIONAL = 0x8;
        const CLASS_DEFAULT_OBJECT = 0x10;
        const ARCHETYPE_OBJECT = 0x20;
        const TRANSIENT = 0x40;
        const MARK_AS_ROOT_SET = 0x80;
        const TAG_GARBAGE_TEMP = 0x100;
        const NEED_INITIALIZATION = 0x200;
        const NEED_LOAD = 0x400;
        const KEEP_FOR_COOKER = 0x800;
        const NEED_POST_LOAD = 0x1000;
        const NEED_POST_LOAD_SUBOBJECTS = 0x2000;
        const NEWER_VERSION_EXISTS = 0x4000;
        const BEGIN_DESTROYED = 0x8000;
        const FINISH_DESTROYED = 0x10000;
        const BEING_REGENERATED = 0x20000;
        const DEFAULT_SUB_OBJECT = 0x40000;
        const WAS_LOADED = 0x80000;
        const TEXT_EXPORT_TRANSIENT = 0x100000;
        const LOAD_COMPLETED = 0x200000;
        const INHERITABLE_COMPONENT_TEMPLATE = 0x400000;
        const DUPLICATE_TRANSIENT = 0x800000;
        const STRICT_CONFIG = 0x1000000;
        const DONT_PROPERTY_REPLICATE = 0x2000000;
        const NON_PIE_DUPLICATE_TRANSIENT = 0x4000000;
        const DYNAMIC = 0x8000000;
        const WILL_BE_LOADED = 0x10000000;
    }
}

impl CastFlags {
    /// Flags carried by every property subtype class
    pub fn is_property(self) -> bool {
        self.contains(CastFlags::PROPERTY)
    }
}
