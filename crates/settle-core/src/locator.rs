//! Element locators.
//!
//! A [`Locator`] names an element abstractly (how to look for it, and what
//! to look for) without referring to any resolved instance. Locators never
//! expire, which is what makes it safe to re-resolve after a scroll or a
//! re-render has invalidated a previously returned handle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a locator or strategy from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorParseError {
    /// The strategy name is not one of the supported strategies.
    #[error("Unknown locator strategy '{0}'")]
    UnknownStrategy(String),

    /// The text had no `strategy=selector` separator.
    #[error("Expected 'strategy=selector', got '{0}'")]
    MissingSeparator(String),

    /// The selector part was empty.
    #[error("Locator selector must not be empty")]
    EmptySelector,
}

/// How the driver should search for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Resource id (Android) or name (iOS).
    Id,
    /// Content description (Android) or accessibility identifier (iOS).
    AccessibilityId,
    /// XPath over the page source.
    XPath,
    /// Native widget class name.
    ClassName,
    /// UiAutomator selector expression (Android only).
    AndroidUiAutomator,
    /// NSPredicate string (iOS only).
    IosPredicate,
    /// Class chain query (iOS only).
    IosClassChain,
}

impl Strategy {
    /// The `using` value sent over the W3C wire protocol.
    pub fn as_w3c(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::XPath => "xpath",
            Strategy::ClassName => "class name",
            Strategy::AndroidUiAutomator => "-android uiautomator",
            Strategy::IosPredicate => "-ios predicate string",
            Strategy::IosClassChain => "-ios class chain",
        }
    }

    /// Short name used in logs and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::AccessibilityId => "accessibility-id",
            Strategy::XPath => "xpath",
            Strategy::ClassName => "class",
            Strategy::AndroidUiAutomator => "uiautomator",
            Strategy::IosPredicate => "predicate",
            Strategy::IosClassChain => "class-chain",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = LocatorParseError;

    /// Accepts both the short names and the W3C `using` values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(Strategy::Id),
            "accessibility-id" | "accessibility id" | "aid" => Ok(Strategy::AccessibilityId),
            "xpath" => Ok(Strategy::XPath),
            "class" | "class name" | "class-name" => Ok(Strategy::ClassName),
            "uiautomator" | "-android uiautomator" => Ok(Strategy::AndroidUiAutomator),
            "predicate" | "-ios predicate string" => Ok(Strategy::IosPredicate),
            "class-chain" | "-ios class chain" => Ok(Strategy::IosClassChain),
            other => Err(LocatorParseError::UnknownStrategy(other.to_string())),
        }
    }
}

/// An immutable strategy/selector pair identifying a UI element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// The search strategy.
    pub strategy: Strategy,
    /// The strategy-specific selector text.
    pub selector: String,
}

impl Locator {
    /// Creates a locator from a strategy and selector.
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    /// Locate by resource id.
    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Id, selector)
    }

    /// Locate by accessibility id / content description.
    pub fn accessibility_id(selector: impl Into<String>) -> Self {
        Self::new(Strategy::AccessibilityId, selector)
    }

    /// Locate by XPath.
    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, selector)
    }

    /// Locate by a raw UiAutomator expression.
    pub fn ui_automator(selector: impl Into<String>) -> Self {
        Self::new(Strategy::AndroidUiAutomator, selector)
    }

    /// Locate an Android element by its exact visible text.
    ///
    /// Quotes and backslashes in `text` are escaped for the UiSelector
    /// string literal.
    pub fn android_text(text: &str) -> Self {
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        Self::ui_automator(format!("new UiSelector().text(\"{}\")", escaped))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.selector)
    }
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    /// Parses `strategy=selector`. Only the first `=` separates, so
    /// selectors may themselves contain `=` (common in XPath).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (strategy, selector) = s
            .split_once('=')
            .ok_or_else(|| LocatorParseError::MissingSeparator(s.to_string()))?;
        if selector.is_empty() {
            return Err(LocatorParseError::EmptySelector);
        }
        Ok(Locator::new(strategy.parse()?, selector))
    }
}
