//! Skills registry.
//!
//! Owns every registered skill and resolves slash-command dispatch by
//! name. Populated once in `main` from the `[skills]` config section,
//! read-only afterwards.

use super::Skill;

pub struct SkillRegistry {
    skills: Vec<Box<dyn Skill>>,
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: Vec::new() }
    }

    pub fn register(&mut self, skill: Box<dyn Skill>) {
        self.skills.push(skill);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Skill> {
        self.skills
            .iter()
            .find(|skill| skill.name() == name)
            .map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Registration-order iteration, used by /help.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Skill> {
        self.skills.iter().map(Box::as_ref)
    }
}
