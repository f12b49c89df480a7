//! Tree-walking renderer for compiled templates.
//!
//! The renderer keeps an explicit environment instead of closures:
//!
//! - a context stack (`this`, `../this`, ...), with the render data at the bottom
//! - a data-frame stack for `@index`, `@key`, `@first`, `@last` (one per iteration level)
//! - a block-param stack for `as |a b|` bindings
//! - a stack of restored capture regions (second pass of the capture protocol)
//! - inline partial frames and the `@partial-block` stack
//!
//! Inside a restored region, lookups that reach past the contexts and iterations
//! opened inside the region are answered from the captured bindings first.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use serde_json::{Map, Value};

use super::ast::{Block, Expression, Mustache, Node, Param, PartialCall, PathExpr, Program, RawBlock};
use super::capture::{CaptureScopeId, InvalidScopeId};
use super::compiled::{PartialTable, RenderOptions, RenderSettings};
use super::error::RenderError;
use super::helpers::{HelperArgs, HelperFn, HelperRegistry, find_similar};
use super::value::{escape_html, is_empty_for_if, is_truthy, navigate_owned, to_output_string};
use crate::constants::{
    CAPTURE_HELPER, CAPTURED_HELPER, MAX_PARTIAL_DEPTH, PARTIAL_BLOCK_NAME, RAW_HELPER,
};

/// Block helpers implemented by the renderer.
const BUILTIN_BLOCKS: [&str; 5] = ["if", "unless", "each", "with", CAPTURED_HELPER];

static NULL: Value = Value::Null;

#[derive(Debug, Clone)]
struct DataFrame {
    index: usize,
    key: Option<String>,
    first: bool,
    last: bool,
}

/// A `{{#captured}}` region being rendered against a parent context.
#[derive(Debug)]
struct RestoredScope {
    bindings: BTreeMap<String, Value>,
    context_height: usize,
    data_height: usize,
    params_height: usize,
}

pub(crate) struct Renderer<'a> {
    helpers: &'a HelperRegistry,
    partials: &'a PartialTable,
    settings: RenderSettings,
    options: RenderOptions<'a>,
    contexts: Vec<Value>,
    data_frames: Vec<DataFrame>,
    block_params: Vec<BTreeMap<String, Value>>,
    restored: Vec<RestoredScope>,
    inline_partials: Vec<HashMap<&'a str, &'a Program>>,
    partial_blocks: Vec<&'a Program>,
    partial_depth: usize,
    out: String,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(
        helpers: &'a HelperRegistry,
        partials: &'a PartialTable,
        settings: RenderSettings,
        options: RenderOptions<'a>,
        data: &Value,
    ) -> Self {
        Self {
            helpers,
            partials,
            settings,
            options,
            contexts: vec![data.clone()],
            data_frames: Vec::new(),
            block_params: Vec::new(),
            restored: Vec::new(),
            inline_partials: Vec::new(),
            partial_blocks: Vec::new(),
            partial_depth: 0,
            out: String::new(),
        }
    }

    pub(crate) fn render(mut self, program: &'a Program) -> Result<String, RenderError> {
        self.inline_partials.push(inline_frame(program));
        self.render_program(program)?;
        Ok(self.out)
    }

    fn render_program(&mut self, program: &'a Program) -> Result<(), RenderError> {
        for node in &program.nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Comment(_) => {}
                Node::Mustache(mustache) => self.render_mustache(mustache)?,
                Node::Block(block) => self.render_block(block)?,
                Node::Partial(call) => self.render_partial(call, None)?,
                Node::PartialBlock(partial_block) => {
                    self.render_partial(&partial_block.call, Some(&partial_block.program))?;
                }
                Node::InlinePartial(inline) => {
                    if let Some(frame) = self.inline_partials.last_mut() {
                        frame.insert(inline.name.as_str(), &inline.program);
                    }
                }
                Node::RawBlock(raw) => self.render_raw_block(raw)?,
            }
        }
        Ok(())
    }

    fn render_mustache(&mut self, mustache: &'a Mustache) -> Result<(), RenderError> {
        let value = self.eval_expression(&mustache.expr, true)?;
        let text = to_output_string(&value);
        if mustache.escaped && self.settings.escape_html {
            self.out.push_str(&escape_html(&text));
        } else {
            self.out.push_str(&text);
        }
        Ok(())
    }

    // ----- expressions -----

    fn current_context(&self) -> &Value {
        self.contexts.last().unwrap_or(&NULL)
    }

    fn eval_expression(&self, expr: &Expression, output: bool) -> Result<Value, RenderError> {
        let helpers = self.helpers;
        if let Some(name) = expr.helper_name()
            && let Some(helper) = helpers.get(name)
        {
            return self.call_helper(name, helper, expr, None);
        }
        if expr.has_arguments() {
            return Err(self.missing_helper(&expr.head_text()));
        }
        match &expr.head {
            Param::Path(path) => self.resolve_path(path, output),
            Param::Literal(value) => Ok(value.clone()),
            Param::SubExpr(sub) => self.eval_subexpression(sub),
        }
    }

    fn eval_subexpression(&self, expr: &Expression) -> Result<Value, RenderError> {
        let helpers = self.helpers;
        match expr.helper_name().and_then(|name| helpers.get(name).map(|h| (name, h))) {
            Some((name, helper)) => self.call_helper(name, helper, expr, None),
            None => Err(self.missing_helper(&expr.head_text())),
        }
    }

    fn eval_param(&self, param: &Param) -> Result<Value, RenderError> {
        match param {
            Param::Path(path) => Ok(self.lookup(path).unwrap_or(Value::Null)),
            Param::Literal(value) => Ok(value.clone()),
            Param::SubExpr(sub) => self.eval_subexpression(sub),
        }
    }

    fn eval_hash(&self, hash: &[(String, Param)]) -> Result<Map<String, Value>, RenderError> {
        hash.iter()
            .map(|(key, param)| Ok((key.clone(), self.eval_param(param)?)))
            .collect()
    }

    fn call_helper(
        &self,
        name: &str,
        helper: &HelperFn,
        expr: &Expression,
        trailing: Option<Value>,
    ) -> Result<Value, RenderError> {
        let mut params = expr
            .params
            .iter()
            .map(|param| self.eval_param(param))
            .collect::<Result<Vec<_>, _>>()?;
        params.extend(trailing);
        let hash = self.eval_hash(&expr.hash)?;
        helper(&HelperArgs {
            name,
            params: &params,
            hash: &hash,
            context: self.current_context(),
        })
        .map_err(|e| RenderError::HelperFailed {
            helper: name.to_string(),
            message: e.0,
        })
    }

    fn missing_helper(&self, name: &str) -> RenderError {
        let candidates = self.helpers.names().chain(BUILTIN_BLOCKS);
        RenderError::MissingHelper {
            name: name.to_string(),
            suggestions: find_similar(name, candidates),
        }
    }

    fn resolve_path(&self, path: &PathExpr, output: bool) -> Result<Value, RenderError> {
        match self.lookup(path) {
            Some(value) => Ok(value),
            None if output && self.settings.strict => {
                let mut available: Vec<&str> = match self.current_context() {
                    Value::Object(map) => map.keys().map(String::as_str).collect(),
                    _ => Vec::new(),
                };
                available.extend(
                    self.block_params
                        .iter()
                        .flat_map(|frame| frame.keys().map(String::as_str)),
                );
                let target = path.parts.first().map_or(path.original.as_str(), String::as_str);
                Err(RenderError::VariableNotFound {
                    path: path.original.clone(),
                    suggestions: find_similar(target, available),
                })
            }
            None => Ok(Value::Null),
        }
    }

    // ----- lookups -----

    fn lookup(&self, path: &PathExpr) -> Option<Value> {
        if path.data {
            return self.lookup_data(path);
        }
        let restored = self.restored.last();
        let params_floor = restored.map_or(0, |scope| scope.params_height);

        if let Some(value) = self.lookup_block_param(path, params_floor..self.block_params.len()) {
            return Some(value);
        }
        if let Some(scope) = restored {
            let opened = self.contexts.len() - scope.context_height;
            if path.depth >= opened
                && let Some(value) = lookup_captured(&scope.bindings, path, path.depth - opened)
            {
                return Some(value);
            }
            if let Some(value) = self.lookup_block_param(path, 0..params_floor) {
                return Some(value);
            }
        }

        let index = self.contexts.len().checked_sub(path.depth + 1)?;
        navigate_owned(&self.contexts[index], &path.parts)
    }

    fn lookup_block_param(&self, path: &PathExpr, range: Range<usize>) -> Option<Value> {
        if path.depth > 0 || path.explicit_this {
            return None;
        }
        let (first, rest) = path.parts.split_first()?;
        let value = self.block_params[range]
            .iter()
            .rev()
            .find_map(|frame| frame.get(first))?;
        navigate_owned(value, rest)
    }

    fn lookup_data(&self, path: &PathExpr) -> Option<Value> {
        let (name, rest) = path.parts.split_first()?;

        if let Some(scope) = self.restored.last() {
            if name == "root" {
                if let Some(root) = scope.bindings.get("@root") {
                    return navigate_owned(root, rest);
                }
            } else {
                let opened = self.data_frames.len() - scope.data_height;
                if path.depth >= opened
                    && let Some(value) =
                        scope.bindings.get(&data_binding_name(path.depth - opened, name))
                {
                    return navigate_owned(value, rest);
                }
            }
        }

        if name == "root" {
            return navigate_owned(self.contexts.first()?, rest);
        }
        let index = self.data_frames.len().checked_sub(path.depth + 1)?;
        let frame = &self.data_frames[index];
        let value = match name.as_str() {
            "index" => Value::from(frame.index),
            "key" => Value::String(frame.key.clone()?),
            "first" => Value::Bool(frame.first),
            "last" => Value::Bool(frame.last),
            _ => return None,
        };
        navigate_owned(&value, rest)
    }

    // ----- blocks -----

    fn render_block(&mut self, block: &'a Block) -> Result<(), RenderError> {
        if block.inverted {
            let value = self.eval_expression(&block.expr, false)?;
            let branch = if is_truthy(&value) {
                block.inverse.as_ref()
            } else {
                Some(&block.program)
            };
            return self.render_optional(branch);
        }

        let helpers = self.helpers;
        if let Some(name) = block.expr.helper_name() {
            if let Some(helper) = helpers.get(name) {
                let value = self.call_helper(name, helper, &block.expr, None)?;
                return self.render_section(block, value);
            }
            match name {
                "if" => return self.render_if(block, false),
                "unless" => return self.render_if(block, true),
                "each" => return self.render_each(block),
                "with" => return self.render_with(block),
                CAPTURED_HELPER => return self.render_captured(block),
                _ => {}
            }
        }
        if block.expr.has_arguments() {
            return Err(self.missing_helper(&block.expr.head_text()));
        }
        let value = self.eval_expression(&block.expr, false)?;
        self.render_section(block, value)
    }

    fn render_optional(&mut self, program: Option<&'a Program>) -> Result<(), RenderError> {
        match program {
            Some(program) => self.render_program(program),
            None => Ok(()),
        }
    }

    fn first_param(&self, block: &Block, helper: &str) -> Result<Value, RenderError> {
        let param = block.expr.params.first().ok_or_else(|| RenderError::HelperFailed {
            helper: helper.to_string(),
            message: format!("#{helper} requires exactly one argument"),
        })?;
        self.eval_param(param)
    }

    fn render_if(&mut self, block: &'a Block, negate: bool) -> Result<(), RenderError> {
        let helper = if negate { "unless" } else { "if" };
        let value = self.first_param(block, helper)?;
        let include_zero = self
            .eval_hash(&block.expr.hash)?
            .get("includeZero")
            .is_some_and(is_truthy);
        let condition = !is_empty_for_if(&value, include_zero);
        if condition != negate {
            self.render_program(&block.program)
        } else {
            self.render_optional(block.inverse.as_ref())
        }
    }

    fn render_with(&mut self, block: &'a Block) -> Result<(), RenderError> {
        let value = self.first_param(block, "with")?;
        if is_truthy(&value) {
            self.render_in_context(block, value)
        } else {
            self.render_optional(block.inverse.as_ref())
        }
    }

    fn render_each(&mut self, block: &'a Block) -> Result<(), RenderError> {
        let value = self.first_param(block, "each")?;
        match value {
            Value::Array(items) if !items.is_empty() => self.iterate_array(block, items),
            Value::Object(map) if !map.is_empty() => {
                let len = map.len();
                for (index, (key, item)) in map.into_iter().enumerate() {
                    let frame = DataFrame {
                        index,
                        key: Some(key.clone()),
                        first: index == 0,
                        last: index + 1 == len,
                    };
                    self.render_iteration(block, item, frame, Value::String(key))?;
                }
                Ok(())
            }
            _ => self.render_optional(block.inverse.as_ref()),
        }
    }

    /// Mustache section semantics for non-builtin blocks.
    fn render_section(&mut self, block: &'a Block, value: Value) -> Result<(), RenderError> {
        match value {
            Value::Bool(true) => self.render_program(&block.program),
            Value::Array(items) if !items.is_empty() => self.iterate_array(block, items),
            value if is_truthy(&value) => self.render_in_context(block, value),
            _ => self.render_optional(block.inverse.as_ref()),
        }
    }

    fn iterate_array(&mut self, block: &'a Block, items: Vec<Value>) -> Result<(), RenderError> {
        let len = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let frame = DataFrame {
                index,
                key: None,
                first: index == 0,
                last: index + 1 == len,
            };
            self.render_iteration(block, item, frame, Value::from(index))?;
        }
        Ok(())
    }

    fn render_iteration(
        &mut self,
        block: &'a Block,
        item: Value,
        frame: DataFrame,
        index_value: Value,
    ) -> Result<(), RenderError> {
        let params = bind_params(&block.block_params, [item.clone(), index_value]);
        self.contexts.push(item);
        self.data_frames.push(frame);
        self.block_params.push(params);
        let result = self.render_program(&block.program);
        self.block_params.pop();
        self.data_frames.pop();
        self.contexts.pop();
        result
    }

    fn render_in_context(&mut self, block: &'a Block, value: Value) -> Result<(), RenderError> {
        let params = bind_params(&block.block_params, [value.clone()]);
        self.contexts.push(value);
        self.block_params.push(params);
        let result = self.render_program(&block.program);
        self.block_params.pop();
        self.contexts.pop();
        result
    }

    // ----- capture protocol -----

    fn render_captured(&mut self, block: &'a Block) -> Result<(), RenderError> {
        let id = to_output_string(&self.first_param(block, CAPTURED_HELPER)?);
        let scope: CaptureScopeId = id.parse().map_err(|e: InvalidScopeId| {
            RenderError::HelperFailed {
                helper: CAPTURED_HELPER.to_string(),
                message: e.to_string(),
            }
        })?;

        let bindings = self
            .options
            .parent_context
            .and_then(|parent| parent.scope_bindings(&scope));
        let Some(bindings) = bindings else {
            if self.options.parent_context.is_some() {
                tracing::warn!(
                    scope = %scope,
                    "Captured scope not found in parent context, rendering against current data"
                );
            }
            return self.render_program(&block.program);
        };

        tracing::trace!(scope = %scope, bindings = bindings.len(), "Restoring captured scope");
        self.restored.push(RestoredScope {
            bindings,
            context_height: self.contexts.len(),
            data_height: self.data_frames.len(),
            params_height: self.block_params.len(),
        });
        let result = self.render_program(&block.program);
        self.restored.pop();
        result
    }

    fn render_raw_block(&mut self, raw: &'a RawBlock) -> Result<(), RenderError> {
        let helpers = self.helpers;
        let Some(name) = raw.expr.helper_name() else {
            return Err(self.missing_helper(&raw.expr.head_text()));
        };
        if let Some(helper) = helpers.get(name) {
            let value =
                self.call_helper(name, helper, &raw.expr, Some(Value::String(raw.body.clone())))?;
            self.out.push_str(&to_output_string(&value));
            return Ok(());
        }
        match name {
            CAPTURE_HELPER => self.render_capture(raw),
            RAW_HELPER => {
                self.out.push_str(&raw.body);
                Ok(())
            }
            _ => Err(self.missing_helper(name)),
        }
    }

    fn render_capture(&mut self, raw: &'a RawBlock) -> Result<(), RenderError> {
        let Some(capturer) = self.options.capturer else {
            self.out.push_str(&raw.body);
            return Ok(());
        };
        let hash = self.eval_hash(&raw.expr.hash)?;
        let bindings = self.capture_bindings(hash);
        let indices = self.data_frames.iter().map(|frame| frame.index).collect();
        let scope = capturer.capture(indices, bindings);
        tracing::trace!(scope = %scope, "Captured template context");

        self.out.push_str("{{#");
        self.out.push_str(CAPTURED_HELPER);
        self.out.push_str(" \"");
        self.out.push_str(&scope.to_string());
        self.out.push_str("\"}}");
        self.out.push_str(&raw.body);
        self.out.push_str("{{/");
        self.out.push_str(CAPTURED_HELPER);
        self.out.push_str("}}");
        Ok(())
    }

    /// Bindings visible at a capture site. Later entries override earlier ones:
    /// inherited restored bindings, context chain, current context keys, block
    /// params, iteration data, `@root`, explicit hash arguments.
    fn capture_bindings(&self, hash: Map<String, Value>) -> BTreeMap<String, Value> {
        let mut bindings = BTreeMap::new();
        let (context_floor, data_floor, params_floor) = match self.restored.last() {
            Some(scope) => {
                let opened_contexts = self.contexts.len() - scope.context_height;
                let opened_frames = self.data_frames.len() - scope.data_height;
                for (name, value) in &scope.bindings {
                    if let Some(shifted) = shift_binding(name, opened_contexts, opened_frames) {
                        bindings.insert(shifted, value.clone());
                    }
                }
                (scope.context_height, scope.data_height, scope.params_height)
            }
            None => (0, 0, 0),
        };

        let visible = &self.contexts[context_floor..];
        for (depth, context) in visible.iter().rev().enumerate() {
            bindings.insert(context_binding_name(depth), context.clone());
        }
        if let Some(Value::Object(current)) = visible.last() {
            for (key, value) in current {
                if !is_structural_binding(key) {
                    bindings.insert(key.clone(), value.clone());
                }
            }
        }
        for frame in &self.block_params[params_floor..] {
            bindings.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for (depth, frame) in self.data_frames[data_floor..].iter().rev().enumerate() {
            bindings.insert(data_binding_name(depth, "index"), Value::from(frame.index));
            if let Some(key) = &frame.key {
                bindings.insert(data_binding_name(depth, "key"), Value::String(key.clone()));
            }
            bindings.insert(data_binding_name(depth, "first"), Value::Bool(frame.first));
            bindings.insert(data_binding_name(depth, "last"), Value::Bool(frame.last));
        }
        if self.restored.is_empty()
            && let Some(root) = self.contexts.first()
        {
            bindings.insert("@root".to_string(), root.clone());
        }
        bindings.extend(hash);
        bindings
    }

    // ----- partials -----

    fn find_partial(&self, name: &str) -> Option<&'a Program> {
        let partials = self.partials;
        self.inline_partials
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
            .or_else(|| partials.get(name).map(|template| &template.program))
    }

    fn render_partial(
        &mut self,
        call: &'a PartialCall,
        block: Option<&'a Program>,
    ) -> Result<(), RenderError> {
        if call.name == PARTIAL_BLOCK_NAME {
            let Some(body) = self.partial_blocks.pop() else {
                return Err(RenderError::MissingPartial {
                    name: call.name.clone(),
                });
            };
            let result = self.render_partial_body(call, body, None);
            self.partial_blocks.push(body);
            return result;
        }

        match self.find_partial(&call.name) {
            Some(program) => self.render_partial_body(call, program, block),
            // Partial blocks render their body when the partial does not exist.
            None => match block {
                Some(fallback) => self.render_program(fallback),
                None => Err(RenderError::MissingPartial {
                    name: call.name.clone(),
                }),
            },
        }
    }

    fn render_partial_body(
        &mut self,
        call: &'a PartialCall,
        program: &'a Program,
        block: Option<&'a Program>,
    ) -> Result<(), RenderError> {
        if self.partial_depth >= MAX_PARTIAL_DEPTH {
            return Err(RenderError::RecursionLimit {
                partial: call.name.clone(),
                max_depth: MAX_PARTIAL_DEPTH,
            });
        }

        let pushed_context = self.partial_context(call)?;
        let has_context = pushed_context.is_some();
        if let Some(context) = pushed_context {
            self.contexts.push(context);
        }
        if let Some(block) = block {
            self.partial_blocks.push(block);
        }
        self.inline_partials.push(inline_frame(program));
        self.partial_depth += 1;

        let result = self.render_program(program);

        self.partial_depth -= 1;
        self.inline_partials.pop();
        if block.is_some() {
            self.partial_blocks.pop();
        }
        if has_context {
            self.contexts.pop();
        }
        result
    }

    /// Context for a partial invocation: the explicit context argument, extended
    /// with hash arguments. `None` keeps the caller's context.
    fn partial_context(&self, call: &PartialCall) -> Result<Option<Value>, RenderError> {
        if call.context.is_none() && call.hash.is_empty() {
            return Ok(None);
        }
        let base = match &call.context {
            Some(param) => self.eval_param(param)?,
            None => self.current_context().clone(),
        };
        if call.hash.is_empty() {
            return Ok(Some(base));
        }
        let mut map = match base {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.extend(self.eval_hash(&call.hash)?);
        Ok(Some(Value::Object(map)))
    }
}

fn inline_frame(program: &Program) -> HashMap<&str, &Program> {
    program
        .inline_partials()
        .map(|inline| (inline.name.as_str(), &inline.program))
        .collect()
}

fn bind_params<const N: usize>(names: &[String], values: [Value; N]) -> BTreeMap<String, Value> {
    names.iter().cloned().zip(values).collect()
}

/// `this`, `../this`, `../../this`, ...
fn context_binding_name(depth: usize) -> String {
    format!("{}this", "../".repeat(depth))
}

/// `@index`, `@../index`, ...
fn data_binding_name(depth: usize, name: &str) -> String {
    format!("@{}{name}", "../".repeat(depth))
}

/// Names reserved for context and iteration bindings. Data keys spelled like
/// these stay reachable through the captured `this`.
fn is_structural_binding(name: &str) -> bool {
    name.starts_with('@') || split_parent_prefix(name).1 == "this"
}

fn split_parent_prefix(name: &str) -> (usize, &str) {
    let mut depth = 0;
    let mut rest = name;
    while let Some(stripped) = rest.strip_prefix("../") {
        depth += 1;
        rest = stripped;
    }
    (depth, rest)
}

/// Re-keys a binding inherited from an enclosing restored region so it stays
/// addressable after `contexts`/`frames` levels were opened inside the region.
fn shift_binding(name: &str, contexts: usize, frames: usize) -> Option<String> {
    if name == "@root" {
        return Some(name.to_string());
    }
    if let Some(data) = name.strip_prefix('@') {
        let (depth, base) = split_parent_prefix(data);
        return Some(data_binding_name(depth + frames, base));
    }
    let (depth, base) = split_parent_prefix(name);
    if base == "this" {
        Some(context_binding_name(depth + contexts))
    } else if contexts == 0 {
        Some(name.to_string())
    } else {
        None
    }
}

fn lookup_captured(
    bindings: &BTreeMap<String, Value>,
    path: &PathExpr,
    depth: usize,
) -> Option<Value> {
    if depth == 0
        && !path.explicit_this
        && let Some((first, rest)) = path.parts.split_first()
        && !is_structural_binding(first)
        && let Some(value) = bindings.get(first)
    {
        return navigate_owned(value, rest);
    }
    let this = bindings.get(&context_binding_name(depth))?;
    navigate_owned(this, &path.parts)
}
