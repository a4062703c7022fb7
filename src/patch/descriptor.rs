//! Declarative patches: a list of sites, each with an expected shape and an action.
//!
//! A [`PatchDescriptor`] pairs every location it touches with the instruction it expects to
//! find there. Resolution checks all sites before anything is modified and reports every
//! mismatch at once, so a drifted target produces one complete report instead of failing on
//! the first site.
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::assembly::{Immediate, OpCode, Operand};
//! use ilpatch::patch::{InstructionPattern, OperandPattern, PatchDescriptor, Site};
//!
//! let tiny = Operand::Immediate(Immediate::Float32(0.0001));
//! let descriptor = PatchDescriptor::new("fast-fade", "Fader", "Update").site(Site::replace_at(
//!     0x0010,
//!     InstructionPattern::new(OpCode::LDC_R4, OperandPattern::NotEquals(tiny.clone())),
//!     tiny,
//! ));
//!
//! assert!(descriptor.validate().is_ok());
//! ```

use std::{collections::HashSet, fmt};

use log::{debug, warn};

use crate::{
    assembly::{Instruction, Operand},
    metadata::method::{InstrId, MethodBody},
    patch::{
        cursor::InstructionCursor,
        pattern::InstructionPattern,
        replace::replace,
        set::{Patch, PatchContext, PatchOutcome},
    },
    Drift,
    Error::{AlreadyApplied, IncompletePatch, InvalidDescriptor, StaleOffsets},
    Result,
};

/// How a site is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Original byte offset of the instruction
    Offset(u32),
    /// Position in the unmodified instruction list
    Index(usize),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Offset(offset) => write!(f, "IL_{offset:04x}"),
            Locator::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// What happens at a site once every site has matched.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteAction {
    /// Nothing; the site only guards the patch
    Check,
    /// Replace the operand, keeping the opcode
    Replace(Operand),
}

/// One location a descriptor inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Where the instruction is
    pub locator: Locator,
    /// What it must look like
    pub expect: InstructionPattern,
    /// What to do with it
    pub action: SiteAction,
}

impl Site {
    /// A guard site.
    #[must_use]
    pub fn check(locator: Locator, expect: InstructionPattern) -> Self {
        Site {
            locator,
            expect,
            action: SiteAction::Check,
        }
    }

    /// Replaces the operand of the instruction at `offset`.
    #[must_use]
    pub fn replace_at(offset: u32, expect: InstructionPattern, operand: Operand) -> Self {
        Site {
            locator: Locator::Offset(offset),
            expect,
            action: SiteAction::Replace(operand),
        }
    }

    /// The instruction this site leaves behind, for replace sites.
    fn replacement(&self) -> Option<Result<Instruction>> {
        match &self.action {
            SiteAction::Check => None,
            SiteAction::Replace(operand) => {
                Some(Instruction::new(self.expect.opcode, operand.clone()))
            }
        }
    }
}

/// A named set of sites in one method.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchDescriptor {
    /// Unique patch name
    pub name: String,
    /// One-line summary
    pub description: String,
    /// Full name of the declaring type
    pub type_name: String,
    /// Name of the patched method
    pub method_name: String,
    /// Sites in declaration order
    pub sites: Vec<Site>,
}

impl PatchDescriptor {
    /// Creates a descriptor without sites.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        PatchDescriptor {
            name: name.into(),
            description: String::new(),
            type_name: type_name.into(),
            method_name: method_name.into(),
            sites: Vec::new(),
        }
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a site.
    #[must_use]
    pub fn site(mut self, site: Site) -> Self {
        self.sites.push(site);
        self
    }

    /// `Type::Method`, as used in reports.
    #[must_use]
    pub fn method(&self) -> String {
        format!("{}::{}", self.type_name, self.method_name)
    }

    /// Checks the descriptor itself, independent of any target.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidDescriptor`] for a descriptor without sites, with two
    /// sites at the same location, or with a replacement operand that does not fit the
    /// expected opcode.
    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(self.invalid("no sites"));
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.locator) {
                return Err(self.invalid(format!("{} is listed twice", site.locator)));
            }

            if let SiteAction::Replace(operand) = &site.action {
                if !operand.targets().is_empty() {
                    return Err(self.invalid(format!(
                        "{}: branch operands cannot be replaced",
                        site.locator
                    )));
                }
                if let Err(error) = operand.check(site.expect.opcode) {
                    return Err(self.invalid(format!("{}: {error}", site.locator)));
                }
            }
        }

        Ok(())
    }

    /// Finds and checks every site in `body`.
    ///
    /// Returns the handle of each site in declaration order.
    ///
    /// # Errors
    /// Returns [`crate::Error::StaleOffsets`] if offset sites are used on an edited body,
    /// [`crate::Error::AlreadyApplied`] if exactly the replace sites mismatch and each
    /// already holds its replacement, and [`crate::Error::IncompletePatch`] listing every
    /// mismatch otherwise.
    pub fn resolve(&self, body: &MethodBody) -> Result<Vec<InstrId>> {
        let cursor = InstructionCursor::new(body);
        let located = self.locate(&cursor, body)?;

        let mut ids = Vec::with_capacity(self.sites.len());
        let mut drifts = Vec::new();
        let mut applied = 0;

        for (site, id) in self.sites.iter().zip(located) {
            let Some(id) = id else {
                let drift = Drift::new(site.expect.describe(), "no instruction");
                drifts.push(match site.locator {
                    Locator::Offset(offset) => drift.at_offset(offset),
                    Locator::Index(index) => drift.at_index(index),
                });
                continue;
            };

            let instruction = body.instruction(id)?;
            match site.expect.check(instruction) {
                Ok(()) => ids.push(id),
                Err(drift) => {
                    if holds_replacement(site, instruction) {
                        applied += 1;
                    }
                    drifts.push(match site.locator {
                        Locator::Index(index) => drift.at_index(index),
                        Locator::Offset(_) => drift,
                    });
                }
            }
        }

        if drifts.is_empty() {
            return Ok(ids);
        }
        let replace_sites = self
            .sites
            .iter()
            .filter(|site| matches!(site.action, SiteAction::Replace(_)))
            .count();
        if applied == drifts.len() && applied == replace_sites {
            return Err(AlreadyApplied(self.name.clone()));
        }
        if applied > 0 {
            warn!(
                "{}: {applied} of {replace_sites} sites already hold the patched value",
                self.name
            );
        }
        Err(IncompletePatch {
            method: self.method(),
            matched: ids.len(),
            expected: self.sites.len(),
            drifts,
        })
    }

    fn locate(
        &self,
        cursor: &InstructionCursor<'_>,
        body: &MethodBody,
    ) -> Result<Vec<Option<InstrId>>> {
        let mut offsets: Vec<u32> = self
            .sites
            .iter()
            .filter_map(|site| match site.locator {
                Locator::Offset(offset) => Some(offset),
                Locator::Index(_) => None,
            })
            .collect();

        if !offsets.is_empty() && body.is_shifted() {
            return Err(StaleOffsets);
        }
        offsets.sort_unstable();
        let found = cursor.scan_offsets(&offsets);

        Ok(self
            .sites
            .iter()
            .map(|site| match site.locator {
                Locator::Offset(offset) => offsets
                    .binary_search(&offset)
                    .ok()
                    .and_then(|position| found[position]),
                Locator::Index(index) => cursor.at_index(index).ok(),
            })
            .collect())
    }

    fn invalid(&self, message: impl Into<String>) -> crate::Error {
        InvalidDescriptor {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

fn holds_replacement(site: &Site, instruction: &Instruction) -> bool {
    match site.replacement() {
        Some(Ok(replacement)) => {
            instruction.opcode == replacement.opcode
                && instruction.operand.same_as(&replacement.operand)
        }
        _ => false,
    }
}

impl Patch for PatchDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        if self.description.is_empty() {
            "No description available"
        } else {
            &self.description
        }
    }

    fn apply(&self, cx: &mut PatchContext<'_>) -> Result<PatchOutcome> {
        self.validate()?;

        let ids = self.resolve(cx.body(&self.type_name, &self.method_name)?)?;
        let edits = self
            .sites
            .iter()
            .zip(ids)
            .filter_map(|(site, id)| site.replacement().map(|r| r.map(|r| (site, id, r))))
            .collect::<Result<Vec<_>>>()?;

        let body = cx.body_mut(&self.type_name, &self.method_name)?;
        for (site, id, instruction) in &edits {
            debug!("{}: {} -> {}", site.locator, site.expect.describe(), instruction.describe());
            replace(body, *id, instruction.clone())?;
        }

        Ok(PatchOutcome {
            name: self.name.clone(),
            method: self.method(),
            replaced: edits.len(),
            inserted: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Immediate, OpCode},
        metadata::{
            method::{MethodAttributes, MethodSignature},
            Module, References,
        },
        patch::{pattern::OperandPattern, Sequence},
        Error,
    };

    const TINY: f32 = 0.0001;

    fn tiny() -> Operand {
        Operand::Immediate(Immediate::Float32(TINY))
    }

    fn timing_site(offset: u32) -> Site {
        Site::replace_at(
            offset,
            InstructionPattern::new(OpCode::LDC_R4, OperandPattern::NotEquals(tiny())),
            tiny(),
        )
    }

    /// `ldc.r4 1.0; pop` at offsets 0 and 6, then `ret`, decoded so offsets are recorded.
    fn module() -> Module {
        let mut sequence = Sequence::new();
        for _ in 0..2 {
            sequence
                .emit(OpCode::LDC_R4, Operand::Immediate(Immediate::Float32(1.0)))
                .emit(OpCode::POP, Operand::None);
        }
        sequence.emit(OpCode::RET, Operand::None);

        let mut module = Module::new("Assembly-CSharp.dll");
        let ty = module.add_type("Fader", 0);
        module
            .add_method(
                ty,
                MethodAttributes::PUBLIC,
                "Update",
                MethodSignature::instance(&[], "System.Void"),
                Some(sequence.into_body().unwrap()),
            )
            .unwrap();
        Module::from_mem(module.to_bytes().unwrap()).unwrap()
    }

    fn descriptor(offsets: &[u32]) -> PatchDescriptor {
        offsets.iter().fold(
            PatchDescriptor::new("fast-fade", "Fader", "Update"),
            |descriptor, &offset| descriptor.site(timing_site(offset)),
        )
    }

    fn apply(module: &mut Module, descriptor: &PatchDescriptor) -> Result<PatchOutcome> {
        let references = References::default();
        descriptor.apply(&mut PatchContext::new(module, &references))
    }

    #[test]
    fn validation() {
        assert!(descriptor(&[0, 6]).validate().is_ok());
        assert!(matches!(
            descriptor(&[]).validate(),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            descriptor(&[6, 6]).validate(),
            Err(Error::InvalidDescriptor { message, .. }) if message.contains("IL_0006")
        ));

        let wrong_kind = PatchDescriptor::new("x", "Fader", "Update").site(Site::replace_at(
            0,
            InstructionPattern::opcode(OpCode::LDC_R4),
            Operand::Immediate(Immediate::Int32(1)),
        ));
        assert!(matches!(
            wrong_kind.validate(),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn replaces_every_site() {
        let mut module = module();
        let outcome = apply(&mut module, &descriptor(&[6, 0])).unwrap();
        assert_eq!(outcome.replaced, 2);

        let body = module.find_method("Fader", "Update", None).unwrap().body().unwrap();
        for index in [0, 2] {
            let instruction = body.instruction(body.at(index).unwrap()).unwrap();
            assert!(instruction.operand.same_as(&tiny()));
        }
    }

    #[test]
    fn missing_site_reports_all_drifts_and_changes_nothing() {
        let mut module = module();
        let before = module.to_bytes().unwrap();

        let err = apply(&mut module, &descriptor(&[0, 5, 7])).unwrap_err();
        match &err {
            Error::IncompletePatch {
                method,
                matched,
                expected,
                drifts,
            } => {
                assert_eq!(method, "Fader::Update");
                assert_eq!((*matched, *expected), (1, 3));
                assert_eq!(drifts.len(), 2);
                assert_eq!(drifts[0].offset, Some(5));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(module.to_bytes().unwrap(), before);
    }

    #[test]
    fn second_application_is_refused() {
        let mut module = module();
        apply(&mut module, &descriptor(&[0, 6])).unwrap();

        let err = apply(&mut module, &descriptor(&[0, 6])).unwrap_err();
        assert!(matches!(err, Error::AlreadyApplied(ref name) if name == "fast-fade"));
        assert!(err.is_drift());
    }

    #[test]
    fn index_guards() {
        let mut module = module();
        let guarded = descriptor(&[0])
            .site(Site::check(
                Locator::Index(4),
                InstructionPattern::opcode(OpCode::RET),
            ))
            .site(Site::check(
                Locator::Index(9),
                InstructionPattern::opcode(OpCode::RET),
            ));

        let err = apply(&mut module, &guarded).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompletePatch { matched: 2, expected: 3, ref drifts, .. }
                if drifts[0].index == Some(9)
        ));
    }
}
