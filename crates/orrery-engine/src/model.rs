//! Mission models and the initialization interface.
//!
//! A mission model is built once, before simulation, through an
//! [`Initializer`]: it allocates cells, exports topics and resources under
//! names, registers activity types, daemons, and constraints. The result
//! is a [`MissionModel`], which the engine consumes.
//!
//! Everything is registered explicitly by name. Nothing is discovered at
//! run time.

use std::collections::BTreeMap;
use std::sync::Arc;

use orrery_resources::{
    Dynamics, ErrorEstimate, ResourceError, SamplingStrategy, SecantConfig, SharedCondition,
    SharedResource,
};
use orrery_timeline::{CellId, CellType, Event, Querier, Timeline, TimelineError, Topic, TopicId};
use orrery_types::{MapperError, SerializedValue, ValueMapper, ValueSchema};
use tracing::debug;

use crate::activity::ActivityTypeSpec;
use crate::error::InstantiationError;
use crate::task::{BoxedTask, TaskFactory};

type EventSerializer = Box<dyn Fn(&Event) -> Option<SerializedValue> + Send + Sync>;
type Sampler = Box<dyn Fn(&Querier<'_>) -> Result<SerializedValue, TimelineError> + Send + Sync>;

/// A topic whose events appear in the event log.
pub struct ExportedTopic {
    name: String,
    id: TopicId,
    schema: ValueSchema,
    serialize: EventSerializer,
}

impl ExportedTopic {
    /// Export name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema of the serialized events.
    pub const fn schema(&self) -> &ValueSchema {
        &self.schema
    }

    /// Underlying topic.
    pub const fn id(&self) -> TopicId {
        self.id
    }

    /// Serialized payload of `event`, if it belongs to this topic.
    pub fn serialize(&self, event: &Event) -> Option<SerializedValue> {
        (self.serialize)(event)
    }
}

/// A resource sampled into the result profiles.
pub struct ExportedResource {
    schema: ValueSchema,
    sample: Sampler,
}

impl ExportedResource {
    /// Schema of the samples.
    pub const fn schema(&self) -> &ValueSchema {
        &self.schema
    }

    /// Serialized value of the resource at the querier's node.
    pub fn sample(&self, querier: &Querier<'_>) -> Result<SerializedValue, TimelineError> {
        (self.sample)(querier)
    }
}

/// Built-in topics that mark the start and end of every activity of one
/// type. Start events carry the effective arguments; end events carry the
/// computed attributes.
#[derive(Debug, Clone, Copy)]
pub struct ActivityTopics {
    /// Emitted when an activity starts.
    pub input: Topic<SerializedValue>,
    /// Emitted when an activity ends.
    pub output: Topic<SerializedValue>,
}

/// Everything registered by a mission model apart from its cells.
#[derive(Default)]
pub struct Registry {
    activity_types: BTreeMap<String, ActivityTypeSpec>,
    activity_topics: BTreeMap<String, ActivityTopics>,
    topics: Vec<ExportedTopic>,
    resources: BTreeMap<String, ExportedResource>,
    daemons: Vec<(String, TaskFactory)>,
    constraints: Vec<(String, SharedCondition)>,
}

impl Registry {
    /// The activity type registered as `type_name`.
    pub fn activity_type(&self, type_name: &str) -> Result<&ActivityTypeSpec, InstantiationError> {
        self.activity_types
            .get(type_name)
            .ok_or_else(|| InstantiationError::UnknownType {
                type_name: type_name.to_owned(),
            })
    }

    /// All activity types, by name.
    pub const fn activity_types(&self) -> &BTreeMap<String, ActivityTypeSpec> {
        &self.activity_types
    }

    /// Start/end topics of `type_name`.
    pub fn activity_topics(&self, type_name: &str) -> Option<ActivityTopics> {
        self.activity_topics.get(type_name).copied()
    }

    /// Exported topics, in registration order.
    pub fn topics(&self) -> &[ExportedTopic] {
        &self.topics
    }

    /// Exported topic that `event` belongs to, if any.
    pub fn exported_topic(&self, event: &Event) -> Option<&ExportedTopic> {
        self.topics.iter().find(|t| t.id == event.topic())
    }

    /// Exported resources, by name.
    pub const fn resources(&self) -> &BTreeMap<String, ExportedResource> {
        &self.resources
    }

    /// Registered daemons.
    pub fn daemons(&self) -> &[(String, TaskFactory)] {
        &self.daemons
    }

    /// Registered constraints.
    pub fn constraints(&self) -> &[(String, SharedCondition)] {
        &self.constraints
    }

    /// Label for `event` in debug traces: export name and value when the
    /// topic is exported, the topic id otherwise.
    pub fn describe(&self, event: &Event) -> String {
        match self.exported_topic(event) {
            Some(topic) => match topic.serialize(event) {
                Some(value) => format!("{}={value}", topic.name),
                None => topic.name.clone(),
            },
            None => event.to_string(),
        }
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("activity_types", &self.activity_types.keys().collect::<Vec<_>>())
            .field("topics", &self.topics.iter().map(ExportedTopic::name).collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("daemons", &self.daemons.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

// ----------------------------------------------------------------------
// Initializer
// ----------------------------------------------------------------------

/// Setup-time interface used by mission-model code.
pub struct Initializer {
    timeline: Timeline,
    registry: Registry,
    secant: SecantConfig,
}

impl Default for Initializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Initializer {
    /// An empty model with the default secant bounds.
    pub fn new() -> Self {
        Self::with_secant(SecantConfig::default())
    }

    /// An empty model whose adaptive black-box sampling uses `secant`.
    pub fn with_secant(secant: SecantConfig) -> Self {
        Self {
            timeline: Timeline::new(),
            registry: Registry::default(),
            secant,
        }
    }

    /// Allocate a cell holding `initial` that interprets events on `topic`.
    pub fn allocate<C, Ev, F>(
        &mut self,
        initial: C::State,
        cell_type: C,
        interpreter: F,
        topic: Topic<Ev>,
    ) -> CellId<C::State>
    where
        C: CellType,
        Ev: Send + Sync + 'static,
        F: Fn(&Ev) -> C::Effect + Send + Sync + 'static,
    {
        self.timeline.allocate(initial, cell_type, interpreter, topic)
    }

    /// Read-only view of the initial state.
    pub fn querier(&self) -> Querier<'_> {
        self.timeline.querier(self.timeline.origin())
    }

    /// Export `topic` under `name`, serializing its events with `mapper`.
    pub fn topic<E, M>(&mut self, name: impl Into<String>, topic: Topic<E>, mapper: M)
    where
        E: Send + Sync + 'static,
        M: ValueMapper<E> + 'static,
    {
        let name = name.into();
        debug!(topic = %name, "Exported topic");
        self.registry.topics.push(ExportedTopic {
            name,
            id: topic.id(),
            schema: mapper.value_schema(),
            serialize: Box::new(move |event| {
                event
                    .extract(&topic)
                    .map(|value| mapper.serialize_value(value))
            }),
        });
    }

    /// Export `resource` under `name`, sampling its current value through
    /// `mapper`.
    pub fn resource<D, M>(&mut self, name: impl Into<String>, resource: SharedResource<D>, mapper: M)
    where
        D: Dynamics,
        M: ValueMapper<D::Value> + 'static,
    {
        let name = name.into();
        debug!(resource = %name, "Exported resource");
        self.registry.resources.insert(
            name,
            ExportedResource {
                schema: mapper.value_schema(),
                sample: Box::new(move |querier| {
                    let delimited = resource.get_dynamics(querier)?;
                    Ok(mapper.serialize_value(&delimited.dynamics.extract()))
                }),
            },
        );
    }

    /// Register a task started at the beginning of every run.
    pub fn daemon<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> BoxedTask + Send + Sync + 'static,
    {
        self.registry.daemons.push((name.into(), Box::new(factory)));
    }

    /// Register an activity type. Also creates and exports its start and
    /// end topics as `ActivityType.Input.<name>` and
    /// `ActivityType.Output.<name>`.
    pub fn activity_type(&mut self, spec: ActivityTypeSpec) -> Result<ActivityTopics, InstantiationError> {
        let name = spec.name().to_owned();
        if self.registry.activity_types.contains_key(&name) {
            return Err(InstantiationError::DuplicateType { type_name: name });
        }
        let topics = ActivityTopics {
            input: Topic::new(),
            output: Topic::new(),
        };
        let input_schema = ValueSchema::structure(
            spec.parameters()
                .iter()
                .map(|p| (p.name.clone(), p.schema.clone())),
        );
        self.topic(
            format!("ActivityType.Input.{name}"),
            topics.input,
            PassThrough(input_schema),
        );
        self.topic(
            format!("ActivityType.Output.{name}"),
            topics.output,
            PassThrough(spec.computed_attributes_schema().clone()),
        );
        self.registry.activity_topics.insert(name.clone(), topics);
        self.registry.activity_types.insert(name, spec);
        Ok(topics)
    }

    /// Register a condition that must hold throughout the run. Violations
    /// are reported in the results.
    pub fn constraint(&mut self, name: impl Into<String>, condition: SharedCondition) {
        self.registry.constraints.push((name.into(), condition));
    }

    /// The configured secant bounds.
    pub const fn secant_config(&self) -> &SecantConfig {
        &self.secant
    }

    /// Adaptive black-box sampling with the configured bounds.
    pub fn adaptive_sampling(&self, estimate: ErrorEstimate) -> Result<SamplingStrategy, ResourceError> {
        SamplingStrategy::adaptive(self.secant, estimate)
    }

    /// Finish initialization.
    pub fn build(self) -> MissionModel {
        debug!(
            cells = self.timeline.cell_count(),
            activity_types = self.registry.activity_types.len(),
            resources = self.registry.resources.len(),
            "Mission model built"
        );
        MissionModel {
            timeline: self.timeline,
            registry: Arc::new(self.registry),
        }
    }
}

/// Serializes values that already are [`SerializedValue`]s, reporting a
/// fixed schema.
struct PassThrough(ValueSchema);

impl ValueMapper<SerializedValue> for PassThrough {
    fn value_schema(&self) -> ValueSchema {
        self.0.clone()
    }

    fn serialize_value(&self, value: &SerializedValue) -> SerializedValue {
        value.clone()
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<SerializedValue, MapperError> {
        Ok(value.clone())
    }
}

/// A fully initialized mission model: its cells, in their initial state,
/// and everything it registered.
pub struct MissionModel {
    timeline: Timeline,
    registry: Arc<Registry>,
}

impl MissionModel {
    /// The registrations.
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn into_parts(self) -> (Timeline, Arc<Registry>) {
        (self.timeline, self.registry)
    }
}

impl core::fmt::Debug for MissionModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MissionModel")
            .field("cells", &self.timeline.cell_count())
            .field("registry", &self.registry)
            .finish()
    }
}
