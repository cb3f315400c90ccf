//! # Repetition and definition levels
//!
//! Nested columns are stored as one leaf column per primitive field. Every
//! entry of a leaf carries a definition level, the number of optional or
//! repeated ancestors that are present, and a repetition level, the depth of
//! the list the entry continues (zero starts a new row).
//!
//! [`ColumnLayout`] maps each top-level field to a tree of [`ColumnNode`]s and
//! the [`LeafColumn`]s underneath it, in both directions:
//! - writing: [`ColumnLayout::for_schema`] also yields the flattened schema,
//!   [`shred`] turns arrays into per-leaf levels and value positions.
//! - reading: [`ColumnLayout::for_file`] resolves the file schema against the
//!   embedded arrow fields, [`Assembler`] rebuilds arrays from decoded
//!   [`LeafChunk`]s.
//!
//! Lists are written as the three-level `LIST` group, maps as a `MAP` group
//! over a repeated `key_value` group, structs as plain groups. Two-level lists
//! and bare repeated fields are accepted on read. Fixed-size lists are stored
//! as lists and restored through the target type.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::enums::error::{InterchangeError, Result};
use crate::io::parquet::encoding::malformed;
use crate::io::parquet::metadata::{
    LeafType, LogicalType, Repetition, SchemaElement, arrow_type, converted, corrupt, leaf_type,
};
use crate::structs::bitmask::Bitmask;
use crate::traits::concatenate::concat_arrays;
use crate::traits::type_unions::OffsetType;
use crate::{Array, Buffer, DataType, Field, Schema};

/// Deepest group nesting accepted in a file schema.
const MAX_DEPTH: usize = 64;

/// One primitive column of the file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeafColumn {
    pub path: Vec<String>,
    /// Position in the flattened schema, root included.
    pub element: usize,
    pub data_type: DataType,
    pub leaf: LeafType,
    pub max_def: u16,
    pub max_rep: u16,
    /// Entries defined at least this far are slots of the leaf's array: the
    /// level of the innermost list element, zero outside lists.
    pub slot_def: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Shape {
    Leaf,
    Struct(Vec<ColumnNode>),
    /// `rep` is the repetition level of the elements.
    List { rep: u16, element: Box<ColumnNode> },
}

/// A field together with the levels it occupies.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnNode {
    pub name: String,
    pub data_type: DataType,
    pub optional: bool,
    /// Definition level of a non-null value.
    pub def: u16,
    pub shape: Shape,
    pub leaves: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ColumnLayout {
    pub fields: Vec<ColumnNode>,
    pub leaves: Vec<LeafColumn>,
}

/// Levels reached at a node's parent.
#[derive(Debug, Clone, Copy)]
struct Depth {
    def: u16,
    rep: u16,
    slot_def: u16,
}

impl Depth {
    const TOP: Depth = Depth {
        def: 0,
        rep: 0,
        slot_def: 0,
    };

    /// Inside the elements of a list that is non-null at `def`.
    fn element(def: u16, rep: u16) -> Self {
        Depth {
            def: def + 1,
            rep: rep + 1,
            slot_def: def + 1,
        }
    }

    fn with_def(self, def: u16) -> Self {
        Depth { def, ..self }
    }
}

fn is_optional(field: &Field) -> bool {
    field.nullable || matches!(field.data_type, DataType::Null)
}

fn joined(parent: &[String], name: &str) -> Vec<String> {
    let mut path = parent.to_vec();
    path.push(name.to_string());
    path
}

// ---------------------------------------------------------------
// Write side
// ---------------------------------------------------------------

impl ColumnLayout {
    /// Layout of `schema` together with the flattened schema it is written as.
    ///
    /// # Errors
    /// `UnsupportedOperation` for structs without fields, maps whose entries
    /// are not a key/value struct, and dictionaries of nested values.
    pub fn for_schema(schema: &Schema) -> Result<(Self, Vec<SchemaElement>)> {
        let mut elements = vec![SchemaElement::root(schema.len())];
        let mut layout = ColumnLayout::default();
        for field in &schema.fields {
            let node = layout.write_node(field, Depth::TOP, &[], &mut elements)?;
            layout.fields.push(node);
        }
        Ok((layout, elements))
    }

    fn write_node(
        &mut self,
        field: &Field,
        depth: Depth,
        parent: &[String],
        elements: &mut Vec<SchemaElement>,
    ) -> Result<ColumnNode> {
        let optional = is_optional(field);
        let repetition = if optional {
            Repetition::Optional
        } else {
            Repetition::Required
        };
        let def = depth.def + optional as u16;
        let path = joined(parent, &field.name);
        let first = self.leaves.len();
        let shape = match &field.data_type {
            DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _) => {
                elements.push(
                    SchemaElement::group(&field.name, repetition, 1)
                        .annotated(LogicalType::List, converted::LIST),
                );
                elements.push(SchemaElement::group("list", Repetition::Repeated, 1));
                let path = joined(&path, "list");
                let element = self.write_node(item, Depth::element(def, depth.rep), &path, elements)?;
                Shape::List {
                    rep: depth.rep + 1,
                    element: Box::new(element),
                }
            }
            DataType::Map(entries, _) => {
                let kv = match &entries.data_type {
                    DataType::Struct(kv) if kv.len() == 2 => kv,
                    other => {
                        return Err(InterchangeError::UnsupportedOperation(format!(
                            "map column '{}' has entries of type {other}, not a key/value struct",
                            field.name
                        )));
                    }
                };
                elements.push(
                    SchemaElement::group(&field.name, repetition, 1)
                        .annotated(LogicalType::Map, converted::MAP),
                );
                elements.push(SchemaElement::group("key_value", Repetition::Repeated, 2));
                let path = joined(&path, "key_value");
                let inner = Depth::element(def, depth.rep);
                let children = kv
                    .iter()
                    .map(|f| self.write_node(f, inner, &path, elements))
                    .collect::<Result<Vec<_>>>()?;
                let element = ColumnNode {
                    name: entries.name.clone(),
                    data_type: entries.data_type.clone(),
                    optional: false,
                    def: inner.def,
                    shape: Shape::Struct(children),
                    leaves: first..self.leaves.len(),
                };
                Shape::List {
                    rep: depth.rep + 1,
                    element: Box::new(element),
                }
            }
            DataType::Struct(children) => {
                if children.is_empty() {
                    return Err(InterchangeError::UnsupportedOperation(format!(
                        "struct column '{}' has no fields to store",
                        field.name
                    )));
                }
                elements.push(SchemaElement::group(&field.name, repetition, children.len()));
                let inner = depth.with_def(def);
                let children = children
                    .iter()
                    .map(|f| self.write_node(f, inner, &path, elements))
                    .collect::<Result<Vec<_>>>()?;
                Shape::Struct(children)
            }
            other => {
                let leaf = leaf_type(other)?;
                elements.push(SchemaElement::leaf(&field.name, repetition, &leaf));
                self.leaves.push(LeafColumn {
                    path,
                    element: elements.len() - 1,
                    data_type: other.clone(),
                    leaf,
                    max_def: def,
                    max_rep: depth.rep,
                    slot_def: depth.slot_def,
                });
                Shape::Leaf
            }
        };
        Ok(ColumnNode {
            name: field.name.clone(),
            data_type: field.data_type.clone(),
            optional,
            def,
            shape,
            leaves: first..self.leaves.len(),
        })
    }
}

/// Levels and value positions of one leaf column.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LeafLevels {
    pub def: Vec<u16>,
    pub rep: Vec<u16>,
    /// Logical indices into the leaf's array of the present values.
    pub values: Vec<usize>,
}

impl LeafLevels {
    fn push(&mut self, def: u16, rep: u16, value: Option<usize>) {
        self.def.push(def);
        self.rep.push(rep);
        self.values.extend(value);
    }

    /// Level ranges holding up to `rows` records each. An empty column gives
    /// one empty range.
    pub fn pages(&self, rows: usize) -> Vec<Range<usize>> {
        let len = self.rep.len();
        let starts: Vec<usize> = (0..len).filter(|&i| self.rep[i] == 0).collect();
        if starts.is_empty() {
            return vec![0..len];
        }
        (0..starts.len())
            .step_by(rows.max(1))
            .map(|r| starts[r]..starts.get(r + rows).copied().unwrap_or(len))
            .collect()
    }
}

/// Appends the levels of every row of `array`, stored as `node`, to `out`,
/// which holds one entry per leaf column of the schema.
///
/// # Errors
/// `SchemaMismatch` when a required field holds a null.
pub(crate) fn shred(node: &ColumnNode, array: &Array, out: &mut [LeafLevels]) -> Result<()> {
    for i in 0..array.len() {
        shred_value(node, array, i, 0, 0, out)?;
    }
    Ok(())
}

fn shred_value(
    node: &ColumnNode,
    array: &Array,
    i: usize,
    def: u16,
    rep: u16,
    out: &mut [LeafLevels],
) -> Result<()> {
    if array.is_null(i) {
        if !node.optional {
            return Err(InterchangeError::SchemaMismatch(format!(
                "non-nullable column '{}' holds nulls",
                node.name
            )));
        }
        for leaf in &mut out[node.leaves.clone()] {
            leaf.push(def, rep, None);
        }
        return Ok(());
    }
    match &node.shape {
        Shape::Leaf => out[node.leaves.start].push(node.def, rep, Some(i)),
        Shape::Struct(children) => {
            let p = array.offset() + i;
            for (child, values) in children.iter().zip(array.children()) {
                shred_value(child, values, p, node.def, rep, out)?;
            }
        }
        Shape::List { rep: level, element } => {
            let p = array.offset() + i;
            let (start, end) = match array.data_type() {
                DataType::FixedSizeList(_, n) => {
                    let n = *n as usize;
                    (p * n, (p + 1) * n)
                }
                _ => array.value_range(p),
            };
            let Some(values) = array.children().first() else {
                return Err(InterchangeError::type_mismatch(
                    "list with a child array",
                    array.data_type().to_string(),
                ));
            };
            if start == end {
                for leaf in &mut out[node.leaves.clone()] {
                    leaf.push(node.def, rep, None);
                }
            }
            for j in start..end {
                let r = if j == start { rep } else { *level };
                shred_value(element, values, j, node.def + 1, r, out)?;
            }
        }
    }
    Ok(())
}

/// Appends the arrays holding each leaf's values, in leaf order.
pub(crate) fn leaf_arrays(node: &ColumnNode, array: &Array, out: &mut Vec<Array>) {
    match &node.shape {
        Shape::Leaf => out.push(array.clone()),
        Shape::Struct(children) => {
            for (child, values) in children.iter().zip(array.children()) {
                leaf_arrays(child, values, out);
            }
        }
        Shape::List { element, .. } => {
            if let Some(values) = array.children().first() {
                leaf_arrays(element, values, out);
            }
        }
    }
}

// ---------------------------------------------------------------
// Read side
// ---------------------------------------------------------------

/// A file schema node with its children.
struct TypeNode<'a> {
    index: usize,
    element: &'a SchemaElement,
    children: Vec<TypeNode<'a>>,
}

fn parse_tree<'a>(
    elements: &'a [SchemaElement],
    pos: &mut usize,
    depth: usize,
) -> Result<TypeNode<'a>> {
    let index = *pos;
    let element = elements
        .get(index)
        .ok_or_else(|| corrupt("schema ends inside a group"))?;
    *pos += 1;
    let n = element.num_children.unwrap_or(0);
    if n < 0 {
        return Err(corrupt(format!(
            "group '{}' has a negative child count",
            element.name
        )));
    }
    if n > 0 && depth >= MAX_DEPTH {
        return Err(corrupt(format!(
            "schema nests deeper than {MAX_DEPTH} groups"
        )));
    }
    let mut children = Vec::with_capacity((n as usize).min(elements.len() - *pos));
    for _ in 0..n {
        children.push(parse_tree(elements, pos, depth + 1)?);
    }
    Ok(TypeNode {
        index,
        element,
        children,
    })
}

fn is_list(e: &SchemaElement) -> bool {
    e.converted_type == Some(converted::LIST) || e.logical_type == Some(LogicalType::List)
}

fn is_map(e: &SchemaElement) -> bool {
    e.converted_type == Some(converted::MAP) || e.logical_type == Some(LogicalType::Map)
}

fn mismatch(e: &SchemaElement, target: &DataType) -> InterchangeError {
    InterchangeError::SchemaMismatch(format!(
        "embedded arrow type {target} does not fit parquet column '{}'",
        e.name
    ))
}

impl ColumnLayout {
    /// Layout of a file schema. `targets`, the embedded arrow fields when
    /// present, decide the array types; otherwise they follow from the
    /// annotations. Also returns the fields of the resolved schema.
    ///
    /// # Errors
    /// `CorruptFooter` for a malformed group structure, `SchemaMismatch` when
    /// `targets` do not fit the file's nesting.
    pub fn for_file(
        elements: &[SchemaElement],
        targets: Option<&[Field]>,
    ) -> Result<(Self, Vec<Field>)> {
        let mut pos = 0;
        let root = parse_tree(elements, &mut pos, 0)?;
        if pos != elements.len() {
            return Err(corrupt(format!(
                "{} schema elements lie outside the root",
                elements.len() - pos
            )));
        }
        if let Some(targets) = targets {
            if targets.len() != root.children.len() {
                return Err(InterchangeError::SchemaMismatch(format!(
                    "embedded arrow schema has {} fields, file has {} columns",
                    targets.len(),
                    root.children.len()
                )));
            }
        }
        let mut layout = ColumnLayout::default();
        let mut fields = Vec::with_capacity(root.children.len());
        for (i, child) in root.children.iter().enumerate() {
            let target = targets.map(|t| &t[i]);
            let (field, node) = layout.read_node(child, target, Depth::TOP, &[], false)?;
            fields.push(field);
            layout.fields.push(node);
        }
        Ok((layout, fields))
    }

    /// `as_element` reads a repeated node as the required element of the
    /// list it forms.
    fn read_node(
        &mut self,
        node: &TypeNode<'_>,
        target: Option<&Field>,
        depth: Depth,
        parent: &[String],
        as_element: bool,
    ) -> Result<(Field, ColumnNode)> {
        let e = node.element;
        let repetition = if as_element {
            Repetition::Required
        } else {
            e.repetition.unwrap_or(Repetition::Optional)
        };
        if repetition == Repetition::Repeated {
            // A bare repeated field: a required list of required elements.
            return self.read_list(e, false, (node, true), target, depth, parent.to_vec());
        }
        let optional = repetition == Repetition::Optional;
        let def = depth.def + optional as u16;
        let path = joined(parent, &e.name);
        let first = self.leaves.len();

        if node.children.is_empty() {
            let data_type = match target {
                Some(t) if t.data_type.is_nested() => return Err(mismatch(e, &t.data_type)),
                Some(t) => t.data_type.clone(),
                None => arrow_type(e)?,
            };
            let leaf = leaf_type(&data_type)?;
            self.leaves.push(LeafColumn {
                path,
                element: node.index,
                data_type: data_type.clone(),
                leaf,
                max_def: def,
                max_rep: depth.rep,
                slot_def: depth.slot_def,
            });
            let field = target
                .cloned()
                .unwrap_or_else(|| Field::new(e.name.clone(), data_type.clone(), optional));
            let column = ColumnNode {
                name: e.name.clone(),
                data_type,
                optional,
                def,
                shape: Shape::Leaf,
                leaves: first..first + 1,
            };
            return Ok((field, column));
        }

        if is_list(e) || is_map(e) {
            let [repeated] = node.children.as_slice() else {
                return Err(corrupt(format!(
                    "group '{}' must hold exactly one repeated field",
                    e.name
                )));
            };
            let r = repeated.element;
            if r.repetition != Some(Repetition::Repeated) {
                return Err(corrupt(format!("'{}' in group '{}' is not repeated", r.name, e.name)));
            }
            if is_map(e) {
                if repeated.children.len() != 2 {
                    return Err(corrupt(format!(
                        "entries of map '{}' need a key and a value",
                        e.name
                    )));
                }
                return self.read_list(e, optional, (repeated, true), target, depth, path);
            }
            let three_level = repeated.children.len() == 1
                && r.name != "array"
                && r.name != format!("{}_tuple", e.name);
            return if three_level {
                let path = joined(&path, &r.name);
                self.read_list(e, optional, (&repeated.children[0], false), target, depth, path)
            } else {
                self.read_list(e, optional, (repeated, true), target, depth, path)
            };
        }

        let targets = match target.map(|t| &t.data_type) {
            None => None,
            Some(DataType::Struct(fields)) if fields.len() == node.children.len() => Some(fields),
            Some(other) => return Err(mismatch(e, other)),
        };
        let inner = depth.with_def(def);
        let mut fields = Vec::with_capacity(node.children.len());
        let mut children = Vec::with_capacity(node.children.len());
        for (i, child) in node.children.iter().enumerate() {
            let (field, column) = self.read_node(child, targets.map(|t| &t[i]), inner, &path, false)?;
            fields.push(field);
            children.push(column);
        }
        let data_type = target.map_or_else(|| DataType::Struct(fields), |t| t.data_type.clone());
        let field = target
            .cloned()
            .unwrap_or_else(|| Field::new(e.name.clone(), data_type.clone(), optional));
        Ok((
            field,
            ColumnNode {
                name: e.name.clone(),
                data_type,
                optional,
                def,
                shape: Shape::Struct(children),
                leaves: first..self.leaves.len(),
            },
        ))
    }

    /// A list (or map) named after `group` whose elements are read from
    /// `element`; `path` leads up to the element.
    fn read_list(
        &mut self,
        group: &SchemaElement,
        optional: bool,
        (element, as_element): (&TypeNode<'_>, bool),
        target: Option<&Field>,
        depth: Depth,
        path: Vec<String>,
    ) -> Result<(Field, ColumnNode)> {
        let map = is_map(group);
        let def = depth.def + optional as u16;
        let inner = Depth::element(def, depth.rep);
        let element_target = match target.map(|t| &t.data_type) {
            None => None,
            Some(DataType::Map(f, _)) if map => Some(f.as_ref()),
            Some(DataType::List(f) | DataType::LargeList(f) | DataType::FixedSizeList(f, _))
                if !map =>
            {
                Some(f.as_ref())
            }
            Some(other) => return Err(mismatch(group, other)),
        };
        let (element_field, element_node) =
            self.read_node(element, element_target, inner, &path, as_element)?;
        let data_type = match target {
            Some(t) => t.data_type.clone(),
            None if map => DataType::Map(Box::new(element_field), false),
            None => DataType::List(Box::new(element_field)),
        };
        let field = target
            .cloned()
            .unwrap_or_else(|| Field::new(group.name.clone(), data_type.clone(), optional));
        Ok((
            field,
            ColumnNode {
                name: group.name.clone(),
                data_type,
                optional,
                def,
                leaves: element_node.leaves.clone(),
                shape: Shape::List {
                    rep: inner.rep,
                    element: Box::new(element_node),
                },
            },
        ))
    }
}

/// Decoded levels and values of one leaf column chunk.
#[derive(Debug, Clone)]
pub(crate) struct LeafChunk {
    pub def: Vec<u16>,
    pub rep: Vec<u16>,
    /// One slot per entry defined at least to the leaf's `slot_def`.
    pub values: Array,
}

/// Rebuilds the arrays of one row group from its leaf chunks.
pub(crate) struct Assembler<'c> {
    chunks: BTreeMap<usize, &'c LeafChunk>,
}

impl<'c> Assembler<'c> {
    /// `chunks` maps leaf column indices to their decoded chunk.
    pub fn new(chunks: BTreeMap<usize, &'c LeafChunk>) -> Self {
        Self { chunks }
    }

    fn chunk(&self, column: usize) -> Result<&'c LeafChunk> {
        self.chunks
            .get(&column)
            .copied()
            .ok_or_else(|| malformed(format!("leaf column {column} was not decoded")))
    }

    /// Array of the top-level column `node`, one slot per row.
    pub fn build(&self, node: &ColumnNode) -> Result<Array> {
        self.node(node, 0, 0)
    }

    /// The slots of `node` are the entries of its first leaf defined at least
    /// to `slot_def` that do not repeat past `slot_rep`.
    fn node(&self, node: &ColumnNode, slot_def: u16, slot_rep: u16) -> Result<Array> {
        match &node.shape {
            Shape::Leaf => Ok(self.chunk(node.leaves.start)?.values.clone()),
            Shape::Struct(children) => {
                let first = self.chunk(node.leaves.start)?;
                let valid: Vec<bool> = first
                    .def
                    .iter()
                    .zip(&first.rep)
                    .filter(|&(&d, &r)| d >= slot_def && r <= slot_rep)
                    .map(|(&d, _)| d >= node.def)
                    .collect();
                let len = valid.len();
                let arrays = children
                    .iter()
                    .map(|c| self.node(c, slot_def, slot_rep))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(bad) = arrays.iter().position(|a| a.len() != len) {
                    return Err(malformed(format!(
                        "field '{}' of struct '{}' holds {} values, the struct has {len}",
                        children[bad].name,
                        node.name,
                        arrays[bad].len()
                    )));
                }
                Array::try_new(node.data_type.clone(), len, 0, mask(&valid), Vec::new(), arrays, None)
            }
            Shape::List { rep, element } => {
                let first = self.chunk(node.leaves.start)?;
                let element_def = node.def + 1;
                let mut valid = Vec::new();
                let mut ends = Vec::new();
                let mut count = 0usize;
                for (&d, &r) in first.def.iter().zip(&first.rep) {
                    if r <= slot_rep {
                        if d < slot_def {
                            continue;
                        }
                        if !valid.is_empty() {
                            ends.push(count);
                        }
                        valid.push(d >= node.def);
                        if d >= element_def {
                            count += 1;
                        }
                    } else if r == *rep && d >= element_def {
                        count += 1;
                    }
                }
                if !valid.is_empty() {
                    ends.push(count);
                }
                let child = self.node(element, element_def, *rep)?;
                if child.len() != count {
                    return Err(malformed(format!(
                        "list '{}' has {count} elements, its values hold {}",
                        node.name,
                        child.len()
                    )));
                }
                list_array(&node.data_type, valid, &ends, child)
            }
        }
    }
}

fn mask(valid: &[bool]) -> Option<Bitmask> {
    if valid.iter().all(|v| *v) {
        None
    } else {
        Some(Bitmask::from_bools(valid))
    }
}

fn offsets<O: OffsetType>(ends: &[usize], data_type: &DataType) -> Result<Buffer> {
    let mut out = Vec::with_capacity((ends.len() + 1) * size_of::<O>());
    O::default().write_le(&mut out);
    for &end in ends {
        let end = O::from_usize(end).ok_or_else(|| {
            InterchangeError::InvalidOffsets(format!(
                "{end} list elements overflow the offsets of {data_type}"
            ))
        })?;
        end.write_le(&mut out);
    }
    Ok(Buffer::from(out))
}

fn list_array(data_type: &DataType, valid: Vec<bool>, ends: &[usize], child: Array) -> Result<Array> {
    let len = valid.len();
    let offsets = match data_type {
        DataType::FixedSizeList(_, n) => {
            return fixed_size_list(data_type, *n as usize, valid, ends, child);
        }
        DataType::LargeList(_) => offsets::<i64>(ends, data_type)?,
        _ => offsets::<i32>(ends, data_type)?,
    };
    Array::try_new(
        data_type.clone(),
        len,
        0,
        mask(&valid),
        vec![offsets],
        vec![child],
        None,
    )
}

/// Null slots hold no elements on disk; they get `n` null placeholders.
fn fixed_size_list(
    data_type: &DataType,
    n: usize,
    valid: Vec<bool>,
    ends: &[usize],
    child: Array,
) -> Result<Array> {
    let mut pieces = Vec::new();
    let (mut prev, mut run) = (0usize, 0usize);
    for (slot, &end) in ends.iter().enumerate() {
        let count = end - prev;
        if count == n {
            prev = end;
            continue;
        }
        if valid[slot] || count != 0 {
            return Err(malformed(format!(
                "fixed-size list slot {slot} holds {count} values, expected {n}"
            )));
        }
        if prev > run {
            pieces.push(child.slice(run, prev - run));
        }
        pieces.push(Array::new_null_typed(child.data_type(), n)?);
        run = prev;
    }
    let child = if pieces.is_empty() {
        child
    } else {
        if prev > run {
            pieces.push(child.slice(run, prev - run));
        }
        concat_arrays(&pieces)?
    };
    Array::try_new(
        data_type.clone(),
        valid.len(),
        0,
        mask(&valid),
        Vec::new(),
        vec![child],
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_of(field: Field, array: &Array) -> (ColumnLayout, Vec<LeafLevels>) {
        let (layout, _) = ColumnLayout::for_schema(&Schema::from(vec![field])).unwrap();
        let mut out = vec![LeafLevels::default(); layout.leaves.len()];
        shred(&layout.fields[0], array, &mut out).unwrap();
        (layout, out)
    }

    fn list_of_ints() -> Array {
        // [[1, 2], null, [], [3]]
        let child = Array::from_slice(&[1i32, 2, 3]);
        let mut offsets = Vec::new();
        for o in [0i32, 2, 2, 2, 3] {
            offsets.extend_from_slice(&o.to_le_bytes());
        }
        Array::try_new(
            DataType::list(DataType::Int32),
            4,
            0,
            Some(Bitmask::from_bools(&[true, false, true, true])),
            vec![Buffer::from(offsets)],
            vec![child],
            None,
        )
        .unwrap()
    }

    #[test]
    fn list_levels_follow_dremel() {
        let field = Field::new("l", DataType::list(DataType::Int32), true);
        let (layout, out) = levels_of(field, &list_of_ints());
        let leaf = &layout.leaves[0];
        assert_eq!((leaf.max_def, leaf.max_rep, leaf.slot_def), (3, 1, 2));
        assert_eq!(leaf.path, vec!["l", "list", "item"]);
        assert_eq!(out[0].def, vec![3, 3, 0, 1, 3]);
        assert_eq!(out[0].rep, vec![0, 1, 0, 0, 0]);
        assert_eq!(out[0].values, vec![0, 1, 2]);
        assert_eq!(out[0].pages(2), vec![0..3, 3..5]);
    }

    #[test]
    fn written_schema_reads_back_as_the_same_layout() {
        let schema = Schema::from(vec![
            Field::new("l", DataType::list(DataType::Int32), true),
            Field::new("m", DataType::map(DataType::Utf8, DataType::Int64, false), true),
            Field::new(
                "s",
                DataType::Struct(vec![
                    Field::new("a", DataType::Boolean, false),
                    Field::new("b", DataType::large_list(DataType::Utf8), true),
                ]),
                false,
            ),
        ]);
        let (written, elements) = ColumnLayout::for_schema(&schema).unwrap();
        let (read, fields) = ColumnLayout::for_file(&elements, None).unwrap();
        assert_eq!(written.leaves.len(), 5);
        let levels = |l: &ColumnLayout| {
            l.leaves
                .iter()
                .map(|c| (c.path.clone(), c.max_def, c.max_rep, c.slot_def))
                .collect::<Vec<_>>()
        };
        assert_eq!(levels(&read), levels(&written));
        // Without the embedded schema large lists come back as lists.
        assert!(matches!(fields[1].data_type, DataType::Map(..)));
        let DataType::Struct(s) = &fields[2].data_type else {
            panic!("expected a struct, got {}", fields[2].data_type);
        };
        assert!(matches!(s[1].data_type, DataType::List(_)));
        // With it, the original types are kept.
        let (_, exact) = ColumnLayout::for_file(&elements, Some(&schema.fields)).unwrap();
        assert_eq!(exact, schema.fields);
    }

    #[test]
    fn legacy_two_level_and_bare_repeated_lists() {
        let int32 = leaf_type(&DataType::Int32).unwrap();
        let int = |name: &str, repetition| SchemaElement::leaf(name, repetition, &int32);
        let elements = vec![
            SchemaElement::root(2),
            SchemaElement::group("a", Repetition::Optional, 1)
                .annotated(LogicalType::List, converted::LIST),
            int("array", Repetition::Repeated),
            int("b", Repetition::Repeated),
        ];
        let (layout, fields) = ColumnLayout::for_file(&elements, None).unwrap();
        for field in &fields {
            let DataType::List(item) = &field.data_type else {
                panic!("expected a list, got {}", field.data_type);
            };
            assert!(!item.nullable);
        }
        assert!(fields[0].nullable && !fields[1].nullable);
        let levels: Vec<_> = layout.leaves.iter().map(|c| (c.max_def, c.max_rep)).collect();
        assert_eq!(levels, vec![(2, 1), (1, 1)]);
    }

    #[test]
    fn malformed_groups_are_corrupt() {
        let dangling = vec![
            SchemaElement::root(1),
            SchemaElement::group("s", Repetition::Optional, 2),
        ];
        assert!(matches!(
            ColumnLayout::for_file(&dangling, None),
            Err(InterchangeError::CorruptFooter(_))
        ));
        let list_without_repeated = vec![
            SchemaElement::root(1),
            SchemaElement::group("l", Repetition::Optional, 1)
                .annotated(LogicalType::List, converted::LIST),
            SchemaElement::leaf("x", Repetition::Optional, &leaf_type(&DataType::Int32).unwrap()),
        ];
        assert!(matches!(
            ColumnLayout::for_file(&list_without_repeated, None),
            Err(InterchangeError::CorruptFooter(_))
        ));
    }

    #[test]
    fn empty_struct_cannot_be_written() {
        let schema = Schema::from(vec![Field::new("s", DataType::Struct(Vec::new()), true)]);
        assert!(matches!(
            ColumnLayout::for_schema(&schema),
            Err(InterchangeError::UnsupportedOperation(_))
        ));
    }
}
