use std::borrow::Cow;

use http::Method;

use super::{RateClass, pattern::PathTemplate, pattern::strip_query};

/// Path prefix every Spoke API route lives under.
pub const SPOKE_BASE_PATH: &str = "/public/v0.2b";

/// A predicate over method and path that assigns a [`RateClass`].
///
/// An empty method list accepts any method and an empty template list accepts
/// any path.
#[derive(Clone, Debug)]
pub struct Rule {
    class: RateClass,
    methods: Vec<Method>,
    paths: Vec<PathTemplate>,
}

impl Rule {
    pub fn new(class: RateClass) -> Self {
        Self {
            class,
            methods: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn path(mut self, template: &str) -> Self {
        self.paths.push(PathTemplate::new(template));
        self
    }

    pub fn class(&self) -> RateClass {
        self.class
    }

    /// `path` is relative to the API base path.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        let method_ok = self.methods.is_empty() || self.methods.contains(method);
        method_ok
            && (self.paths.is_empty() || self.paths.iter().any(|template| template.matches(path)))
    }
}

/// The Spoke rule table, highest priority first.
fn spoke_rules() -> Vec<Rule> {
    vec![
        Rule::new(RateClass::DriverCreation)
            .method(Method::POST)
            .path("/drivers"),
        Rule::new(RateClass::BatchImportStops)
            .method(Method::POST)
            .path("/plans/:planId/stops:import")
            .path("/unassignedStops:import"),
        Rule::new(RateClass::BatchImportDrivers)
            .method(Method::POST)
            .path("/drivers:import"),
        Rule::new(RateClass::PlanOptimization)
            .method(Method::POST)
            .path("/plans/:planId:optimize")
            .path("/plans/:planId:reoptimize"),
        Rule::new(RateClass::Write)
            .method(Method::POST)
            .method(Method::PATCH)
            .method(Method::DELETE),
        Rule::new(RateClass::Read).method(Method::GET),
    ]
}

/// Maps requests to their [`RateClass`].
///
/// Classification is pure. It strips the query string and the API base path,
/// then returns the class of the first rule that matches. Requests outside the
/// base path and requests no rule claims are [`RateClass::Unclassified`] and
/// pass through unthrottled.
///
/// ```rust
/// use http::Method;
/// use spoke_rate_limit::throttle::{Classifier, RateClass};
///
/// let classifier = Classifier::default();
/// assert_eq!(
///     classifier.classify(&Method::POST, "/public/v0.2b/plans/123:optimize"),
///     RateClass::PlanOptimization,
/// );
/// assert_eq!(classifier.classify(&Method::POST, "/elsewhere"), RateClass::Unclassified);
/// ```
#[derive(Clone, Debug)]
pub struct Classifier {
    base_path: Cow<'static, str>,
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(SPOKE_BASE_PATH)
    }
}

impl Classifier {
    /// A classifier with the Spoke rule table under `base_path`.
    ///
    /// An empty base path (or `/`) matches paths as given. A trailing slash on
    /// the base path is ignored.
    pub fn new(base_path: impl Into<Cow<'static, str>>) -> Self {
        let base_path = match base_path.into() {
            Cow::Borrowed(path) => Cow::Borrowed(path.trim_end_matches('/')),
            Cow::Owned(path) => Cow::Owned(path.trim_end_matches('/').to_string()),
        };

        Self {
            base_path,
            rules: spoke_rules(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule wins, so a method a verb route rejects still falls
    /// through to the generic lanes: `GET /plans/123:optimize` is [`RateClass::Read`].
    pub fn classify(&self, method: &Method, path: &str) -> RateClass {
        let Some(relative) = self.relative_path(strip_query(path)) else {
            trace!(%method, path, base_path = %self.base_path, "Outside API base path.");
            return RateClass::Unclassified;
        };

        self.rules
            .iter()
            .find(|rule| rule.matches(method, relative))
            .map_or(RateClass::Unclassified, Rule::class)
    }

    pub fn classify_request<B>(&self, request: &http::Request<B>) -> RateClass {
        self.classify(request.method(), request.uri().path())
    }

    fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let relative = path.strip_prefix(self.base_path.as_ref())?;
        if relative.is_empty() {
            Some("/")
        } else if relative.starts_with('/') {
            Some(relative)
        } else {
            None
        }
    }
}
