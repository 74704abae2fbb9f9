//! Activity types: hand-written registration data for plannable behaviour.
//!
//! An [`ActivityTypeSpec`] is plain data: a name, declared parameters with
//! schemas, default arguments, an optional validator, the schema of the
//! computed attributes, and a constructor that turns effective arguments
//! into a task. Mission models build one per activity and register it with
//! the [`crate::Initializer`].
//!
//! Effective arguments are the defaults overlaid by the supplied
//! arguments. Instantiation rejects unknown, missing, and ill-typed
//! arguments before anything runs; validation failures are only reported.

use core::fmt;

use orrery_types::{SerializedValue, ValueSchema};
use serde::{Deserialize, Serialize};

use crate::error::InstantiationError;
use crate::task::{Arguments, BoxedTask};

/// A declared activity parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Argument name.
    pub name: String,
    /// Admissible values.
    pub schema: ValueSchema,
}

type Constructor = Box<dyn Fn(&Arguments) -> Result<BoxedTask, InstantiationError> + Send + Sync>;
type Validator = Box<dyn Fn(&Arguments) -> Vec<String> + Send + Sync>;

/// Everything the engine needs to know about one activity type.
pub struct ActivityTypeSpec {
    name: String,
    parameters: Vec<Parameter>,
    defaults: Arguments,
    validator: Option<Validator>,
    computed_attributes: ValueSchema,
    constructor: Constructor,
}

impl ActivityTypeSpec {
    /// A type with no parameters whose task is built by `constructor`.
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Arguments) -> Result<BoxedTask, InstantiationError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            defaults: Arguments::new(),
            validator: None,
            computed_attributes: ValueSchema::structure::<String, _>([]),
            constructor: Box::new(constructor),
        }
    }

    /// Declare a required parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, schema: ValueSchema) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            schema,
        });
        self
    }

    /// Declare a parameter with a default value.
    #[must_use]
    pub fn parameter_with_default(
        mut self,
        name: impl Into<String>,
        schema: ValueSchema,
        default: impl Into<SerializedValue>,
    ) -> Self {
        let name = name.into();
        self.defaults.insert(name.clone(), default.into());
        self.parameters.push(Parameter { name, schema });
        self
    }

    /// Attach a validator that reports human-readable problems.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Arguments) -> Vec<String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Declare the schema of the value the task completes with.
    #[must_use]
    pub fn computed_attributes(mut self, schema: ValueSchema) -> Self {
        self.computed_attributes = schema;
        self
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters, in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Default arguments.
    pub const fn defaults(&self) -> &Arguments {
        &self.defaults
    }

    /// Schema of the computed attributes.
    pub const fn computed_attributes_schema(&self) -> &ValueSchema {
        &self.computed_attributes
    }

    /// Parameters with neither a supplied nor a default value.
    pub fn missing_arguments(&self, supplied: &Arguments) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| !supplied.contains_key(&p.name) && !self.defaults.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Defaults overlaid by `supplied`, checked against the declared
    /// parameters.
    pub fn effective_arguments(&self, supplied: &Arguments) -> Result<Arguments, InstantiationError> {
        let extraneous: Vec<String> = supplied
            .keys()
            .filter(|name| !self.parameters.iter().any(|p| &p.name == *name))
            .cloned()
            .collect();
        if !extraneous.is_empty() {
            return Err(InstantiationError::ExtraneousArguments {
                type_name: self.name.clone(),
                parameters: extraneous,
            });
        }

        let missing = self.missing_arguments(supplied);
        if !missing.is_empty() {
            return Err(InstantiationError::MissingArguments {
                type_name: self.name.clone(),
                parameters: missing,
            });
        }

        let mut effective = self.defaults.clone();
        effective.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));

        for parameter in &self.parameters {
            let accepted = effective
                .get(&parameter.name)
                .is_some_and(|value| parameter.schema.validate(value));
            if !accepted {
                return Err(InstantiationError::IllTyped {
                    type_name: self.name.clone(),
                    parameter: parameter.name.clone(),
                    reason: format!("value does not match schema {:?}", parameter.schema),
                });
            }
        }
        Ok(effective)
    }

    /// Problems the validator reports for these effective arguments.
    pub fn validation_failures(&self, effective: &Arguments) -> Vec<String> {
        self.validator
            .as_ref()
            .map_or_else(Vec::new, |validate| validate(effective))
    }

    /// Build a task from supplied arguments. Returns the effective
    /// arguments along with the task.
    pub fn instantiate(&self, supplied: &Arguments) -> Result<(Arguments, BoxedTask), InstantiationError> {
        let effective = self.effective_arguments(supplied)?;
        let task = (self.constructor)(&effective)?;
        Ok((effective, task))
    }
}

impl fmt::Debug for ActivityTypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityTypeSpec")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Read a typed argument from effective arguments through `mapper`.
pub fn argument<T, M: orrery_types::ValueMapper<T>>(
    type_name: &str,
    arguments: &Arguments,
    name: &str,
    mapper: &M,
) -> Result<T, InstantiationError> {
    let value = arguments.get(name).ok_or_else(|| InstantiationError::MissingArguments {
        type_name: type_name.to_owned(),
        parameters: vec![name.to_owned()],
    })?;
    mapper
        .deserialize_value(value)
        .map_err(|source| InstantiationError::ill_typed(type_name, name, &source))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orrery_types::RealValueMapper;

    use super::*;
    use crate::task::{StepFn, TaskStatus};

    fn bite() -> ActivityTypeSpec {
        ActivityTypeSpec::new("BiteBanana", |args| {
            let size = argument("BiteBanana", args, "biteSize", &RealValueMapper)?;
            Ok(Box::new(StepFn::new(move |_, _| Ok(TaskStatus::Completed(SerializedValue::Real(size))))) as BoxedTask)
        })
        .parameter_with_default("biteSize", ValueSchema::Real, 1.0)
        .validator(|args| match args.get("biteSize").and_then(SerializedValue::as_real) {
            Some(size) if size <= 0.0 => vec!["bite size must be positive".to_owned()],
            _ => Vec::new(),
        })
    }

    #[test]
    fn defaults_fill_unsupplied_parameters() {
        let effective = bite().effective_arguments(&Arguments::new()).unwrap();
        assert_eq!(effective.get("biteSize"), Some(&SerializedValue::Real(1.0)));
    }

    #[test]
    fn supplied_arguments_override_defaults() {
        let supplied = Arguments::from([("biteSize".to_owned(), SerializedValue::Real(2.5))]);
        let (effective, _task) = bite().instantiate(&supplied).unwrap();
        assert_eq!(effective.get("biteSize"), Some(&SerializedValue::Real(2.5)));
    }

    #[test]
    fn unknown_and_ill_typed_arguments_are_rejected() {
        let extra = Arguments::from([("peel".to_owned(), SerializedValue::Int(1))]);
        assert!(matches!(
            bite().effective_arguments(&extra),
            Err(InstantiationError::ExtraneousArguments { .. })
        ));
        let wrong = Arguments::from([("biteSize".to_owned(), SerializedValue::from("big"))]);
        assert!(matches!(
            bite().effective_arguments(&wrong),
            Err(InstantiationError::IllTyped { .. })
        ));
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let spec = ActivityTypeSpec::new("Grow", |_| Err(InstantiationError::Unconstructable {
            type_name: "Grow".to_owned(),
            reason: "never built".to_owned(),
        }))
        .parameter("growingDuration", ValueSchema::Duration);
        assert_eq!(spec.missing_arguments(&Arguments::new()), vec!["growingDuration".to_owned()]);
        assert!(matches!(
            spec.instantiate(&Arguments::new()),
            Err(InstantiationError::MissingArguments { .. })
        ));
    }

    #[test]
    fn validation_failures_are_data() {
        let spec = bite();
        let negative = spec
            .effective_arguments(&Arguments::from([("biteSize".to_owned(), SerializedValue::Real(-1.0))]))
            .unwrap();
        assert_eq!(spec.validation_failures(&negative), vec!["bite size must be positive".to_owned()]);
        let fine = spec.effective_arguments(&Arguments::new()).unwrap();
        assert!(spec.validation_failures(&fine).is_empty());
    }
}
