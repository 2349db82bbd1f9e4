//! Version constraint expressions.
//!
//! A [`VersionConstraint`] is a set-algebraic predicate over [`Version`]s,
//! built from comparator/version pairs (`=`, `<`, `<=`, `>`, `>=`, `*`)
//! combined by intersection (whitespace) and union (`||`). A bare version is
//! shorthand for `=`. Constraints are normalized to a canonical union of
//! disjoint intervals, so equality of two constraints is definitional
//! equivalence rather than textual equality.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use crate::{Error, Version, parse_version_lenient};

/// The comparison operator of a single constraint primary.
///
/// ## Note
///
/// The variant order matters: two-character operators are listed before
/// one-character ones, as parsing tries the operators in declaration order.
#[derive(AsRefStr, Clone, Copy, Debug, EnumIter, Eq, PartialEq)]
pub enum Comparison {
    /// The version must be less than or equal to the given one (`<=`).
    #[strum(serialize = "<=")]
    LessOrEqual,
    /// The version must be greater than or equal to the given one (`>=`).
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    /// The version must be less than the given one (`<`).
    #[strum(serialize = "<")]
    Less,
    /// The version must be greater than the given one (`>`).
    #[strum(serialize = ">")]
    Greater,
    /// The version must be equal to the given one (`=`).
    #[strum(serialize = "=")]
    Equal,
}

impl Comparison {
    /// Returns whether an [`Ordering`] between a candidate version and the
    /// constraint version satisfies this comparison.
    ///
    /// ## Examples
    /// ```
    /// use std::cmp::Ordering;
    ///
    /// use spm_types::Comparison;
    ///
    /// assert!(Comparison::GreaterOrEqual.is_compatible_with(Ordering::Equal));
    /// assert!(!Comparison::Less.is_compatible_with(Ordering::Greater));
    /// ```
    pub fn is_compatible_with(self, ord: Ordering) -> bool {
        match (self, ord) {
            (Comparison::Less, Ordering::Less)
            | (Comparison::LessOrEqual, Ordering::Less | Ordering::Equal)
            | (Comparison::Equal, Ordering::Equal)
            | (Comparison::GreaterOrEqual, Ordering::Greater | Ordering::Equal)
            | (Comparison::Greater, Ordering::Greater) => true,
            _ => false,
        }
    }
}

/// One end of an interval over versions.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Bound {
    /// No bound on this side.
    Unbounded,
    /// The bounding version itself is part of the interval.
    Included(Version),
    /// The bounding version itself is not part of the interval.
    Excluded(Version),
}

/// Compares two lower bounds; `Unbounded` is the smallest, an excluded
/// version starts just above the same included version.
fn cmp_lower(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

/// Compares two upper bounds; `Unbounded` is the largest, an excluded
/// version ends just below the same included version.
fn cmp_upper(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

/// A contiguous range of versions.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Interval {
    lower: Bound,
    upper: Bound,
}

impl Interval {
    /// The interval covering every version.
    fn full() -> Self {
        Interval {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// The interval built from a single comparator/version primary.
    fn primary(comparison: Comparison, version: Version) -> Self {
        match comparison {
            Comparison::Equal => Interval {
                lower: Bound::Included(version.clone()),
                upper: Bound::Included(version),
            },
            Comparison::Less => Interval {
                lower: Bound::Unbounded,
                upper: Bound::Excluded(version),
            },
            Comparison::LessOrEqual => Interval {
                lower: Bound::Unbounded,
                upper: Bound::Included(version),
            },
            Comparison::Greater => Interval {
                lower: Bound::Excluded(version),
                upper: Bound::Unbounded,
            },
            Comparison::GreaterOrEqual => Interval {
                lower: Bound::Included(version),
                upper: Bound::Unbounded,
            },
        }
    }

    /// Returns whether no version can lie in the interval.
    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }

    /// Returns whether `version` lies in the interval.
    fn contains(&self, version: &Version) -> bool {
        let lower_ok = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => version >= l,
            Bound::Excluded(l) => version > l,
        };
        let upper_ok = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => version <= u,
            Bound::Excluded(u) => version < u,
        };
        lower_ok && upper_ok
    }

    /// Intersects two intervals; the result may be empty.
    fn intersect(&self, other: &Interval) -> Interval {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Greater {
            self.lower.clone()
        } else {
            other.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Less {
            self.upper.clone()
        } else {
            other.upper.clone()
        };
        Interval { lower, upper }
    }

    /// Returns whether an interval starting at `lower` continues or overlaps
    /// an interval ending at `upper`, i.e. whether their union is contiguous.
    fn joins(upper: &Bound, lower: &Bound) -> bool {
        match (upper, lower) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
            (Bound::Included(u), Bound::Included(l))
            | (Bound::Included(u), Bound::Excluded(l))
            | (Bound::Excluded(u), Bound::Included(l)) => l <= u,
            (Bound::Excluded(u), Bound::Excluded(l)) => l < u,
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, Bound::Unbounded) => write!(f, "*"),
            (Bound::Included(l), Bound::Included(u)) if l == u => write!(f, "={l}"),
            (lower, upper) => {
                let mut parts = Vec::new();
                match lower {
                    Bound::Unbounded => {}
                    Bound::Included(l) => parts.push(format!(">={l}")),
                    Bound::Excluded(l) => parts.push(format!(">{l}")),
                }
                match upper {
                    Bound::Unbounded => {}
                    Bound::Included(u) => parts.push(format!("<={u}")),
                    Bound::Excluded(u) => parts.push(format!("<{u}")),
                }
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

/// A set-algebraic predicate over [`Version`]s.
///
/// Internally a canonical, sorted union of disjoint intervals, so two
/// constraints compare equal iff they allow exactly the same versions.
///
/// ## Examples
/// ```
/// use spm_types::{VersionConstraint, parse_version};
///
/// # fn main() -> Result<(), spm_types::Error> {
/// let constraint: VersionConstraint = ">=1.0.0 <2.0.0 || =3.0.0".parse()?;
///
/// assert!(constraint.allows_all(&parse_version("1.5.0")?));
/// assert!(constraint.allows_all(&parse_version("3.0.0")?));
/// assert!(!constraint.allows_all(&parse_version("2.1.0")?));
///
/// // Equality is definitional, not textual.
/// let other: VersionConstraint = "=3.0.0 || <2.0.0 >=1.0.0".parse()?;
/// assert_eq!(constraint, other);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionConstraint {
    intervals: Vec<Interval>,
}

impl VersionConstraint {
    /// The constraint allowing any version (`*`).
    pub fn any() -> Self {
        VersionConstraint {
            intervals: vec![Interval::full()],
        }
    }

    /// The constraint allowing exactly `version`.
    pub fn exactly(version: Version) -> Self {
        VersionConstraint {
            intervals: vec![Interval::primary(Comparison::Equal, version)],
        }
    }

    /// Returns whether `version` satisfies the constraint.
    pub fn allows_all(&self, version: &Version) -> bool {
        self.intervals
            .iter()
            .any(|interval| interval.contains(version))
    }

    /// Returns whether the constraint allows every version.
    pub fn is_any(&self) -> bool {
        self.intervals
            .iter()
            .any(|interval| *interval == Interval::full())
    }

    /// Normalizes a union of intervals: drops empty intervals, sorts by
    /// lower bound and merges contiguous neighbors.
    fn normalize(intervals: Vec<Interval>) -> Self {
        let mut intervals: Vec<Interval> = intervals
            .into_iter()
            .filter(|interval| !interval.is_empty())
            .collect();
        intervals
            .sort_by(|a, b| cmp_lower(&a.lower, &b.lower).then(cmp_upper(&a.upper, &b.upper)));

        let mut merged: Vec<Interval> = Vec::new();
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if Interval::joins(&last.upper, &interval.lower) => {
                    if cmp_upper(&interval.upper, &last.upper) == Ordering::Greater {
                        last.upper = interval.upper;
                    }
                }
                _ => merged.push(interval),
            }
        }
        VersionConstraint { intervals: merged }
    }

    /// Parses a single whitespace-separated conjunction of primaries into
    /// its intersection interval.
    fn parse_conjunction(expression: &str) -> Result<Interval, Error> {
        let mut interval = Interval::full();
        let mut primaries = 0;
        for primary in expression.split_whitespace() {
            primaries += 1;
            if primary == "*" {
                continue;
            }
            let (comparison, version) = Comparison::iter()
                .find_map(|comparison| {
                    primary
                        .strip_prefix(comparison.as_ref())
                        .map(|rest| (comparison, rest))
                })
                .unwrap_or((Comparison::Equal, primary));
            let version = parse_version_lenient(version)
                .map_err(|_| Error::InvalidConstraint(expression.to_string()))?;
            interval = interval.intersect(&Interval::primary(comparison, version));
        }
        if primaries == 0 {
            return Err(Error::InvalidConstraint(expression.to_string()));
        }
        Ok(interval)
    }
}

impl Default for VersionConstraint {
    /// Defaults to the constraint allowing any version.
    fn default() -> Self {
        VersionConstraint::any()
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    /// Parses a constraint expression.
    ///
    /// The grammar is a `||`-separated disjunction of whitespace-separated
    /// conjunctions of primaries; a primary is `*` or `[op]version` with op
    /// one of `=`, `<`, `<=`, `>`, `>=` (a bare version means `=`).
    ///
    /// # Errors
    ///
    /// Returns an error if the expression or any contained version is
    /// malformed, or if a disjunction arm is empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(Error::InvalidConstraint(s.to_string()));
        }
        let intervals = s
            .split("||")
            .map(VersionConstraint::parse_conjunction)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VersionConstraint::normalize(intervals))
    }
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.intervals.is_empty() {
            // The canonical rendering of the unsatisfiable constraint:
            // no version orders below the smallest semver version.
            return write!(f, "<0.0.0-0");
        }
        let rendered: Vec<String> = self
            .intervals
            .iter()
            .map(|interval| interval.to_string())
            .collect();
        write!(f, "{}", rendered.join(" || "))
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A named package paired with a version constraint.
///
/// The text form is `"<name>[ <constraint-expr>]"`; when the constraint
/// expression is omitted, any version is allowed.
///
/// ## Examples
/// ```
/// use spm_types::{PackageConstraint, parse_version};
///
/// # fn main() -> Result<(), spm_types::Error> {
/// let dep: PackageConstraint = "swss >=1.0.0".parse()?;
/// assert_eq!(dep.name, "swss");
/// assert!(dep.constraint.allows_all(&parse_version("1.2.0")?));
///
/// let unconstrained: PackageConstraint = "syncd".parse()?;
/// assert!(unconstrained.constraint.is_any());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageConstraint {
    /// The name of the package.
    pub name: String,
    /// The version constraint for the package.
    pub constraint: VersionConstraint,
}

impl FromStr for PackageConstraint {
    type Err = Error;

    /// Parses a package constraint from its text form.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the constraint expression is
    /// malformed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, expression) = match s.split_once(char::is_whitespace) {
            Some((name, expression)) => (name, Some(expression.trim())),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(Error::InvalidPackageConstraint {
                expression: s.to_string(),
                reason: "missing package name".to_string(),
            });
        }
        let constraint = match expression {
            Some(expression) => {
                expression
                    .parse()
                    .map_err(|_| Error::InvalidPackageConstraint {
                        expression: s.to_string(),
                        reason: format!("invalid constraint expression '{expression}'"),
                    })?
            }
            None => VersionConstraint::any(),
        };
        Ok(PackageConstraint {
            name: name.to_string(),
            constraint,
        })
    }
}

impl Display for PackageConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.constraint.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.constraint)
        }
    }
}

impl Serialize for PackageConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn version(s: &str) -> Version {
        crate::parse_version(s).unwrap()
    }

    #[rstest]
    #[case("*", "1.0.0", true)]
    #[case("*", "0.0.1-alpha", true)]
    #[case("1.2.0", "1.2.0", true)]
    #[case("1.2.0", "1.2.1", false)]
    #[case("=1.2.0", "1.2.0", true)]
    #[case(">=1.0.0", "1.0.0", true)]
    #[case(">1.0.0", "1.0.0", false)]
    #[case("<2.0.0", "1.9.9", true)]
    #[case("<=2.0.0", "2.0.0", true)]
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case(">=1.0.0 <2.0.0", "2.0.0", false)]
    #[case(">=1.0.0 <2.0.0 || >=3.0.0", "3.1.0", true)]
    #[case(">=1.0.0 <2.0.0 || >=3.0.0", "2.5.0", false)]
    #[case(">=2.0", "2.0.0", true)]
    #[case(">=2.0", "1.9.0", false)]
    #[case("<3", "2.99.99", true)]
    fn allows_all(#[case] expression: &str, #[case] candidate: &str, #[case] allowed: bool) {
        let constraint: VersionConstraint = expression.parse().unwrap();
        assert_eq!(constraint.allows_all(&version(candidate)), allowed, "{expression} vs {candidate}");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case(">=1.0.0 ||")]
    #[case("|| >=1.0.0")]
    #[case(">=not.a.version")]
    #[case("><1.0.0")]
    fn invalid_expressions(#[case] expression: &str) {
        assert!(expression.parse::<VersionConstraint>().is_err());
    }

    #[rstest]
    #[case(">=1.0.0 <2.0.0 || =3.0.0", "=3.0.0 || <2.0.0 >=1.0.0")]
    #[case(">=1.0.0 <2.0.0 || >=1.5.0 <3.0.0", ">=1.0.0 <3.0.0")]
    #[case("<=2.0.0 || >2.0.0", "*")]
    #[case("=1.0.0 || =1.0.0", "1.0.0")]
    #[case(">=1.0.0 <1.0.0", ">2.0.0 <1.0.0")]
    fn definitional_equality(#[case] a: &str, #[case] b: &str) {
        let a: VersionConstraint = a.parse().unwrap();
        let b: VersionConstraint = b.parse().unwrap();
        assert_eq!(a, b);
    }

    #[rstest]
    #[case(">=1.0.0 <2.0.0", "=2.0.0 || >=1.0.0 <2.0.0")]
    #[case("*", ">=1.0.0")]
    fn definitional_inequality(#[case] a: &str, #[case] b: &str) {
        let a: VersionConstraint = a.parse().unwrap();
        let b: VersionConstraint = b.parse().unwrap();
        assert_ne!(a, b);
    }

    #[rstest]
    #[case("*", "*")]
    #[case("1.2.3", "=1.2.3")]
    #[case(">=1.0.0 <2.0.0 || =3.0.0", ">=1.0.0 <2.0.0 || =3.0.0")]
    #[case("=3.0.0 || >=1.0.0 <2.0.0", ">=1.0.0 <2.0.0 || =3.0.0")]
    #[case("<=2.0.0 || >2.0.0", "*")]
    fn canonical_display(#[case] expression: &str, #[case] rendered: &str) {
        let constraint: VersionConstraint = expression.parse().unwrap();
        assert_eq!(constraint.to_string(), rendered);
        // The canonical form parses back to an equal constraint.
        assert_eq!(constraint.to_string().parse::<VersionConstraint>().unwrap(), constraint);
    }

    #[rstest]
    #[case("swss", "swss", "*")]
    #[case("swss >=1.0.0", "swss", ">=1.0.0")]
    #[case("  syncd   <2.0.0 ", "syncd", "<2.0.0")]
    #[case("bar >=2.0", "bar", ">=2.0.0")]
    fn package_constraint_from_str(
        #[case] expression: &str,
        #[case] name: &str,
        #[case] constraint: &str,
    ) {
        let package: PackageConstraint = expression.parse().unwrap();
        assert_eq!(package.name, name);
        assert_eq!(package.constraint, constraint.parse().unwrap());
    }

    #[test]
    fn package_constraint_rejects_empty() {
        assert!("".parse::<PackageConstraint>().is_err());
        assert!("  ".parse::<PackageConstraint>().is_err());
        assert!("foo not-a-version".parse::<PackageConstraint>().is_err());
    }

    prop_compose! {
        fn arb_version()(major in 0u64..4, minor in 0u64..4, patch in 0u64..4) -> Version {
            Version::new(major, minor, patch)
        }
    }

    fn arb_comparison() -> impl Strategy<Value = Comparison> {
        prop_oneof![
            Just(Comparison::Less),
            Just(Comparison::LessOrEqual),
            Just(Comparison::Equal),
            Just(Comparison::GreaterOrEqual),
            Just(Comparison::Greater),
        ]
    }

    proptest! {
        /// A single-primary constraint agrees with direct version comparison.
        #[test]
        fn primary_agrees_with_comparison(
            comparison in arb_comparison(),
            target in arb_version(),
            candidate in arb_version(),
        ) {
            let expression = format!("{}{}", comparison.as_ref(), target);
            let constraint: VersionConstraint = expression.parse().unwrap();
            prop_assert_eq!(
                constraint.allows_all(&candidate),
                comparison.is_compatible_with(candidate.cmp(&target))
            );
        }

        /// Union is order-independent: `a || b` equals `b || a`.
        #[test]
        fn union_commutes(
            ca in arb_comparison(), va in arb_version(),
            cb in arb_comparison(), vb in arb_version(),
        ) {
            let a = format!("{}{}", ca.as_ref(), va);
            let b = format!("{}{}", cb.as_ref(), vb);
            let ab: VersionConstraint = format!("{a} || {b}").parse().unwrap();
            let ba: VersionConstraint = format!("{b} || {a}").parse().unwrap();
            prop_assert_eq!(ab, ba);
        }

        /// The canonical rendering parses back to an equal constraint.
        #[test]
        fn display_roundtrip(
            ca in arb_comparison(), va in arb_version(),
            cb in arb_comparison(), vb in arb_version(),
        ) {
            let expression = format!("{}{} || {}{}", ca.as_ref(), va, cb.as_ref(), vb);
            let constraint: VersionConstraint = expression.parse().unwrap();
            let reparsed: VersionConstraint = constraint.to_string().parse().unwrap();
            prop_assert_eq!(reparsed, constraint);
        }
    }
}
