//! Finding objects by name

use super::{ClassView, EnumView, FunctionView, ObjectView, StructView};
use crate::flags::CastFlags;
use crate::schema::DiscoveredSchema;

/// Name-based object search
///
/// The typed finders accept an object either by cast flags or by the
/// name of its class, so they work before cast flags are discovered.
pub trait ObjectLookup {
    /// Object whose full name (`Class /Path.To.Name`) equals `full_name`
    fn find_object(&self, full_name: &str) -> Option<ObjectView<'_>>;

    /// First object named `name` (instance number 0) whose class carries
    /// any of `flags`
    fn find_object_fast(&self, name: &str, flags: CastFlags) -> Option<ObjectView<'_>>;

    /// Object named `name` directly inside an object named `outer`
    fn find_object_in_outer(&self, name: &str, outer: &str) -> Option<ObjectView<'_>>;

    fn find_class(&self, name: &str) -> Option<ClassView<'_>>;
    fn find_struct(&self, name: &str) -> Option<StructView<'_>>;
    fn find_enum(&self, name: &str) -> Option<EnumView<'_>>;
    fn find_function(&self, name: &str) -> Option<FunctionView<'_>>;
}

/// Objects named exactly `name`, compared by name index
fn named<'s>(
    schema: &'s DiscoveredSchema,
    name: &str,
) -> impl Iterator<Item = ObjectView<'s>> + 's {
    let index = schema.name_table().search(name);
    index.into_iter().flat_map(move |index| {
        schema.objects().filter(move |o| {
            o.fname()
                .is_some_and(|n| n.comparison_index == index && n.number == 0)
        })
    })
}

/// Whether `object` is typed by `flags`, or failing that by its class name
fn typed(object: &ObjectView<'_>, flags: CastFlags, class_names: &[&str]) -> bool {
    if object.is_a(flags) {
        return true;
    }
    object
        .class()
        .and_then(|c| c.name())
        .is_some_and(|n| class_names.contains(&n.as_str()))
}

impl ObjectLookup for DiscoveredSchema {
    fn find_object(&self, full_name: &str) -> Option<ObjectView<'_>> {
        self.objects()
            .find(|o| o.full_name().is_some_and(|n| n == full_name))
    }

    fn find_object_fast(&self, name: &str, flags: CastFlags) -> Option<ObjectView<'_>> {
        named(self, name).find(|o| o.is_a(flags))
    }

    fn find_object_in_outer(&self, name: &str, outer: &str) -> Option<ObjectView<'_>> {
        named(self, name).find(|o| o.outer().is_some_and(|p| p.name_is(outer)))
    }

    fn find_class(&self, name: &str) -> Option<ClassView<'_>> {
        named(self, name)
            .find(|o| typed(o, CastFlags::CLASS, &["Class", "BlueprintGeneratedClass"]))
            .map(ClassView::wrap)
    }

    fn find_struct(&self, name: &str) -> Option<StructView<'_>> {
        named(self, name)
            .find(|o| typed(o, CastFlags::STRUCT, &["ScriptStruct", "Class", "Function"]))
            .map(StructView::wrap)
    }

    fn find_enum(&self, name: &str) -> Option<EnumView<'_>> {
        named(self, name)
            .find(|o| typed(o, CastFlags::ENUM, &["Enum", "UserDefinedEnum"]))
            .map(EnumView::wrap)
    }

    fn find_function(&self, name: &str) -> Option<FunctionView<'_>> {
        named(self, name)
            .find(|o| typed(o, CastFlags::FUNCTION, &["Function", "DelegateFunction"]))
            .map(FunctionView::wrap)
    }
}
