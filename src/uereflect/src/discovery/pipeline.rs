//! Ordered discovery steps
//!
//! Each step names the offsets it reads and the ones it settles, so the
//! order can be checked before anything touches target memory.

use super::{dispatch, ffield, fname, identity, properties, structs, text, Discovery, Invoker};
use crate::error::{Error, Result};
use crate::offsets::FieldKey::{self, *};
use crate::schema::DiscoveredSchema;

use std::collections::BTreeSet;

/// One unit of discovery
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    /// Offsets that must be settled by an earlier step
    pub inputs: &'static [FieldKey],
    pub outputs: &'static [FieldKey],
    pub run: fn(&mut Discovery<'_>) -> Result<()>,
}

impl Step {
    pub const fn new(
        name: &'static str,
        inputs: &'static [FieldKey],
        outputs: &'static [FieldKey],
        run: fn(&mut Discovery<'_>) -> Result<()>,
    ) -> Self {
        Self { name, inputs, outputs, run }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
}

const IDENTITY: &[FieldKey] = &[ObjectFlags, ObjectIndex, ObjectClass, ObjectOuter, ObjectName];
const STRUCT_WALK: &[FieldKey] =
    &[ObjectClass, ObjectName, ObjectOuter, ClassCastFlags, StructChildren, FieldNext];

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Every step, in dependency order
    pub fn standard() -> Self {
        Self::new(vec![
            Step::new("object flags", &[], &[ObjectVft, ObjectFlags], identity::object_flags),
            Step::new("object index", &[ObjectFlags], &[ObjectIndex], identity::object_index),
            Step::new("object class", &[ObjectIndex], &[ObjectClass], identity::object_class),
            Step::new(
                "object outer",
                &[ObjectClass, ObjectIndex],
                &[ObjectOuter],
                identity::object_outer,
            ),
            Step::new(
                "object name",
                &[ObjectFlags, ObjectIndex, ObjectClass],
                &[ObjectName, ObjectOuter],
                identity::object_name,
            ),
            Step::new(
                "name layout",
                IDENTITY,
                &[FNameComparisonIndex, FNameNumber],
                fname::name_layout,
            ),
            Step::new("cast flags", IDENTITY, &[ClassCastFlags], structs::cast_flags),
            Step::new(
                "struct children",
                &[ObjectName, ObjectOuter, ClassCastFlags],
                &[StructChildren],
                structs::children,
            ),
            Step::new(
                "field next",
                &[ObjectName, StructChildren],
                &[FieldNext],
                structs::field_next,
            ),
            Step::new("struct super", &[ObjectName], &[StructSuper], structs::super_struct),
            Step::new(
                "child properties",
                &[StructChildren],
                &[StructChildProperties],
                structs::child_properties,
            ),
            Step::new("struct size", &[ObjectName], &[StructSize], structs::size),
            Step::new(
                "struct alignment",
                &[ObjectName],
                &[StructMinAlignment],
                structs::min_alignment,
            ),
            Step::new(
                "field layout",
                &[StructChildProperties],
                &[
                    FFieldVft, FFieldClass, FFieldOwner, FFieldNext, FFieldName, FFieldFlags,
                    FFieldClassName, FFieldClassId, FFieldClassCastFlags, FFieldClassClassFlags,
                    FFieldClassSuper,
                ],
                ffield::field_layout,
            ),
            Step::new(
                "default object",
                &[ObjectName],
                &[ClassDefaultObject],
                structs::default_object,
            ),
            Step::new(
                "implemented interfaces",
                &[ClassDefaultObject],
                &[ClassImplementedInterfaces],
                structs::implemented_interfaces,
            ),
            Step::new(
                "enum names",
                &[ObjectName, ClassCastFlags],
                &[EnumNames],
                structs::enum_names,
            ),
            Step::new(
                "function flags",
                &[ObjectName, ClassCastFlags],
                &[FunctionFlags],
                structs::function_flags,
            ),
            Step::new("function exec", &[FunctionFlags], &[FunctionExec], structs::function_exec),
            Step::new(
                "property fields",
                STRUCT_WALK,
                &[PropertyElementSize, PropertyArrayDim, PropertyOffset, PropertyFlags],
                properties::fields,
            ),
            Step::new("name verification", &[PropertyElementSize], &[], fname::verify_layout),
            Step::new(
                "bool property",
                &[PropertyOffset],
                &[BoolPropertyBase],
                properties::bool_base,
            ),
            Step::new(
                "enum property",
                &[PropertyOffset],
                &[EnumPropertyBase],
                properties::enum_base,
            ),
            Step::new(
                "property size",
                &[EnumPropertyBase, BoolPropertyBase],
                &[PropertySize],
                properties::property_size,
            ),
            Step::new(
                "property subtypes",
                &[PropertySize],
                &[
                    ObjectPropertyClass, BytePropertyEnum, StructPropertyStruct,
                    DelegatePropertySignature,
                ],
                properties::subtypes,
            ),
            Step::new(
                "container properties",
                &[PropertySize],
                &[
                    ArrayPropertyInner, SetPropertyElement, MapPropertyBase, FieldPathPropertyClass,
                    OptionalPropertyValue,
                ],
                properties::containers,
            ),
            Step::new(
                "class property",
                &[ObjectPropertyClass],
                &[ClassPropertyMetaClass],
                properties::meta_class,
            ),
            Step::new("dispatch", &[ObjectVft, FunctionFlags], &[], dispatch::locate),
            Step::new(
                "text",
                &[FunctionFlags, PropertyFlags, PropertyOffset, PropertyElementSize, StructSize],
                &[TextData, TextString, TextSize],
                text::text_layout,
            ),
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check that every input is produced by an earlier step.
    ///
    /// Offsets listed in no step's outputs at all (supplied only through
    /// configuration) are not checked.
    pub fn validate(&self) -> Result<()> {
        let produced_anywhere: BTreeSet<FieldKey> = self
            .steps
            .iter()
            .flat_map(|s| s.outputs.iter().copied())
            .collect();

        let mut settled = BTreeSet::new();
        for step in &self.steps {
            for input in step.inputs {
                if produced_anywhere.contains(input) && !settled.contains(input) {
                    return Err(Error::Config(format!(
                        "step '{}' needs {} before it is discovered",
                        step.name, input
                    )));
                }
            }
            settled.extend(step.outputs.iter().copied());
        }
        Ok(())
    }

    /// Run every step against `schema`. Only fatal errors stop the run.
    pub fn run(&self, schema: &mut DiscoveredSchema, invoker: Option<&dyn Invoker>) -> Result<()> {
        let mut discovery = Discovery { schema, invoker };

        for step in &self.steps {
            tracing::debug!("Running discovery step '{}'", step.name);
            match (step.run)(&mut discovery) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!("Step '{}' failed: {}", step.name, e),
            }
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}
