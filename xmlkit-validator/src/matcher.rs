//! Stateful content-model matching.
//!
//! Each open element with complex content owns a [`GroupMatcher`] that
//! consumes child element names in document order and tracks occurrence
//! counts. Nested model groups instantiate sub-matchers per occurrence;
//! choice groups commit to the first branch that accepts a child.

use std::rc::Rc;
use xmlkit_model::registry::{ContentModel, ElementSpec, Particle, Term, TypeRegistry};
use xmlkit_syntax::types::{GroupKind, MaxOccurs, ProcessContents, QName};

/// What a successful match resolved to.
#[derive(Clone, Debug)]
pub enum ChildMatch {
    /// A declared element particle.
    Spec(Rc<ElementSpec>),
    /// An `xs:any` wildcard; content is skipped or laxly checked.
    Wildcard(ProcessContents),
}

#[derive(Clone)]
pub struct GroupMatcher {
    kind: GroupKind,
    particles: Vec<ParticleState>,
    /// Sequence cursor.
    pos: usize,
    /// Committed choice branch.
    chosen: Option<usize>,
}

#[derive(Clone)]
struct ParticleState {
    min: u32,
    max: MaxOccurs,
    /// Completed occurrences (for groups: completed instances).
    count: u32,
    term: TermState,
}

#[derive(Clone)]
enum TermState {
    Element(Rc<ElementSpec>),
    Ref(QName),
    Group(GroupKind, Rc<Vec<Particle>>, Option<Box<GroupMatcher>>),
    Any(ProcessContents),
}

impl GroupMatcher {
    pub fn from_content(content: &ContentModel) -> Option<GroupMatcher> {
        let (kind, particles) = match content {
            ContentModel::Empty => return None,
            ContentModel::Sequence(p) => (GroupKind::Sequence, p),
            ContentModel::Choice(p) => (GroupKind::Choice, p),
            ContentModel::All(p) => (GroupKind::All, p),
        };
        Some(GroupMatcher::new(kind, particles))
    }

    fn new(kind: GroupKind, particles: &[Particle]) -> GroupMatcher {
        GroupMatcher {
            kind,
            particles: particles
                .iter()
                .map(|p| ParticleState {
                    min: p.min,
                    max: p.max,
                    count: 0,
                    term: match &p.term {
                        Term::Element(spec) => TermState::Element(spec.clone()),
                        Term::Ref(name) => TermState::Ref(name.clone()),
                        Term::Model(kind, inner) => {
                            TermState::Group(*kind, Rc::new(inner.clone()), None)
                        }
                        Term::Any(pc) => TermState::Any(*pc),
                    },
                })
                .collect(),
            pos: 0,
            chosen: None,
        }
    }

    /// Try to consume one child element. On failure the state is
    /// unchanged and a description of what was expected is returned.
    pub fn accept(
        &mut self,
        name: &QName,
        registry: &TypeRegistry,
    ) -> Result<ChildMatch, String> {
        match self.kind {
            GroupKind::Sequence => self.accept_sequence(name, registry),
            GroupKind::Choice => self.accept_choice(name, registry),
            GroupKind::All => self.accept_all(name, registry),
        }
    }

    fn accept_sequence(
        &mut self,
        name: &QName,
        registry: &TypeRegistry,
    ) -> Result<ChildMatch, String> {
        for i in self.pos..self.particles.len() {
            // Skipping forward over unsatisfied required particles is a
            // validity error even when a later particle matches.
            if i > self.pos {
                let skipped = &self.particles[i - 1];
                if !skipped.satisfied() {
                    return Err(self.describe_expected(registry));
                }
            }
            if let Some(matched) = self.particles[i].try_accept(name, registry) {
                self.pos = i;
                return Ok(matched);
            }
        }
        Err(self.describe_expected(registry))
    }

    fn accept_choice(
        &mut self,
        name: &QName,
        registry: &TypeRegistry,
    ) -> Result<ChildMatch, String> {
        if let Some(chosen) = self.chosen {
            return self.particles[chosen]
                .try_accept(name, registry)
                .ok_or_else(|| self.describe_expected(registry));
        }
        for i in 0..self.particles.len() {
            if let Some(matched) = self.particles[i].try_accept(name, registry) {
                self.chosen = Some(i);
                return Ok(matched);
            }
        }
        Err(self.describe_expected(registry))
    }

    fn accept_all(&mut self, name: &QName, registry: &TypeRegistry) -> Result<ChildMatch, String> {
        for particle in &mut self.particles {
            if let Some(matched) = particle.try_accept(name, registry) {
                return Ok(matched);
            }
        }
        Err(self.describe_expected(registry))
    }

    /// Whether the element could close now without violating minimums.
    pub fn close_ok(&self) -> bool {
        match self.kind {
            GroupKind::Sequence | GroupKind::All => {
                self.particles.iter().all(|p| p.satisfied())
            }
            GroupKind::Choice => match self.chosen {
                Some(i) => self.particles[i].satisfied(),
                None => self.particles.iter().any(|p| p.min == 0 || p.nullable()),
            },
        }
    }

    /// Names of the particles a close would still require.
    pub fn missing(&self, registry: &TypeRegistry) -> Vec<String> {
        let mut out = Vec::new();
        match self.kind {
            GroupKind::Sequence | GroupKind::All => {
                for p in &self.particles {
                    if !p.satisfied() {
                        p.names(registry, &mut out);
                    }
                }
            }
            GroupKind::Choice => {
                if !self.close_ok() {
                    for p in &self.particles {
                        p.names(registry, &mut out);
                    }
                }
            }
        }
        out
    }

    fn describe_expected(&self, registry: &TypeRegistry) -> String {
        let mut names = Vec::new();
        match self.kind {
            GroupKind::Sequence => {
                for p in &self.particles[self.pos..] {
                    p.names(registry, &mut names);
                    if !p.satisfied() {
                        break;
                    }
                }
            }
            GroupKind::Choice | GroupKind::All => {
                for p in &self.particles {
                    p.names(registry, &mut names);
                }
            }
        }
        const MAX_NAMES: usize = 4;
        if names.is_empty() {
            "no further elements".to_string()
        } else if names.len() > MAX_NAMES {
            let rest = names.len() - MAX_NAMES;
            format!("{} .. or one of {rest} more", names[..MAX_NAMES].join(", "))
        } else {
            names.join(", ")
        }
    }
}

impl ParticleState {
    fn max_reached(&self) -> bool {
        match self.max {
            MaxOccurs::Bounded(n) => self.count >= n,
            MaxOccurs::Unbounded => false,
        }
    }

    fn satisfied(&self) -> bool {
        match &self.term {
            TermState::Element(_) | TermState::Ref(_) | TermState::Any(_) => self.count >= self.min,
            TermState::Group(_, _, active) => {
                let (done, pending_incomplete) = match active {
                    None => (self.count, false),
                    Some(a) => {
                        if a.close_ok() {
                            (self.count + 1, false)
                        } else {
                            (self.count, true)
                        }
                    }
                };
                !pending_incomplete && (done >= self.min || self.nullable())
            }
        }
    }

    /// A particle that can be satisfied by zero input.
    fn nullable(&self) -> bool {
        if self.min == 0 {
            return true;
        }
        match &self.term {
            TermState::Group(kind, template, _) => {
                let fresh = GroupMatcher::new(*kind, template);
                fresh.close_ok()
            }
            _ => false,
        }
    }

    fn try_accept(&mut self, name: &QName, registry: &TypeRegistry) -> Option<ChildMatch> {
        let at_max = self.max_reached();
        match &mut self.term {
            TermState::Element(spec) => {
                if !at_max {
                    if let Some(m) = match_element(spec, name, registry) {
                        self.count += 1;
                        return Some(m);
                    }
                }
                None
            }
            TermState::Ref(reference) => {
                if at_max {
                    return None;
                }
                let global = registry.global_element(reference)?;
                if let Some(m) = match_element(&global, name, registry) {
                    self.count += 1;
                    return Some(m);
                }
                None
            }
            TermState::Any(pc) => {
                if at_max {
                    return None;
                }
                self.count += 1;
                Some(ChildMatch::Wildcard(*pc))
            }
            TermState::Group(kind, template, active) => {
                if let Some(current) = active {
                    let mut probe = current.clone();
                    if let Ok(m) = probe.accept(name, registry) {
                        **current = *probe;
                        return Some(m);
                    }
                    // The running instance cannot take this child; close it
                    // and see whether a fresh occurrence can.
                    if !current.close_ok() || at_max {
                        return None;
                    }
                    let mut fresh = GroupMatcher::new(*kind, template);
                    if let Ok(m) = fresh.accept(name, registry) {
                        self.count += 1;
                        *active = Some(Box::new(fresh));
                        return Some(m);
                    }
                    None
                } else {
                    if at_max {
                        return None;
                    }
                    let mut fresh = GroupMatcher::new(*kind, template);
                    if let Ok(m) = fresh.accept(name, registry) {
                        *active = Some(Box::new(fresh));
                        return Some(m);
                    }
                    None
                }
            }
        }
    }

    fn names(&self, registry: &TypeRegistry, out: &mut Vec<String>) {
        match &self.term {
            TermState::Element(spec) => out.push(spec.name.local.clone()),
            TermState::Ref(reference) => out.push(reference.local.clone()),
            TermState::Any(_) => out.push("*".to_string()),
            TermState::Group(kind, template, _) => {
                let fresh = GroupMatcher::new(*kind, template);
                for p in &fresh.particles {
                    p.names(registry, out);
                }
            }
        }
    }
}

/// Match an instance element name against a declaration, following the
/// declaration's substitution group members when the head name differs.
fn match_element(
    spec: &Rc<ElementSpec>,
    name: &QName,
    registry: &TypeRegistry,
) -> Option<ChildMatch> {
    if names_equal(&spec.name, name) {
        if spec.is_abstract {
            return None;
        }
        return Some(ChildMatch::Spec(spec.clone()));
    }
    for member in registry.substitution_members(&spec.name) {
        if names_equal(member, name) {
            if let Some(member_spec) = registry.global_element(member) {
                return Some(ChildMatch::Spec(member_spec));
            }
        }
    }
    None
}

fn names_equal(decl: &QName, instance: &QName) -> bool {
    decl.local == instance.local && decl.namespace == instance.namespace
}
