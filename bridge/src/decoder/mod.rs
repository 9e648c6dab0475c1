//! Engine variable -> host value.
//!
//! Decoding is a short, linear conversation with the engine: ask for the
//! runtime type, then issue the print statements that type needs and parse
//! what comes back. Nothing the engine prints is ever evaluated.

pub mod parse;

use crate::encoder::is_identifier;
use crate::protocol::{self, TableAxis};
use crate::transport::{RetryPolicy, ResponseKind, Transport, TransportError, request_text};
use crate::types::{RuntimeType, ScalarTag, normalize_tag};
use crate::value::{HostValue, NdArray, Scalar, Table};

pub use parse::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{0:?} is not a valid C++ identifier")]
    InvalidName(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("unsupported {container} element type: {tag}")]
    UnsupportedElement { container: &'static str, tag: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("shape {shape:?} does not match {found} elements")]
    ShapeMismatch { shape: Vec<usize>, found: usize },
}

/// Reads variables out of a live engine.
pub struct Decoder<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    retry: &'a RetryPolicy,
}

impl<'a, T: Transport + ?Sized> Decoder<'a, T> {
    pub fn new(transport: &'a mut T, retry: &'a RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Decode the engine variable `name`.
    pub async fn decode(&mut self, name: &str) -> Result<HostValue, DecodeError> {
        if !is_identifier(name) {
            return Err(DecodeError::InvalidName(name.to_string()));
        }
        let (tag, runtime) = self.runtime_type(name).await?;
        tracing::debug!(name, tag = %tag, "decoding");
        match runtime {
            Some(RuntimeType::Scalar(t)) => {
                let text = self.stream(&protocol::print_value(name)).await?;
                Ok(HostValue::Scalar(parse::scalar(t, &text)?))
            }
            Some(RuntimeType::Sequence) => self.sequence(name).await,
            Some(RuntimeType::Mapping) => self.mapping(name).await,
            Some(RuntimeType::NdArray) => self.nd_array(name).await,
            Some(RuntimeType::Table) => self.table(name).await,
            None => Err(DecodeError::UnsupportedType(tag)),
        }
    }

    async fn sequence(&mut self, name: &str) -> Result<HostValue, DecodeError> {
        let items = self.elements(name).await?;
        if items.is_empty() {
            return Ok(HostValue::Sequence(Vec::new()));
        }
        let tag = self.element_tag("sequence", &protocol::element_of(name)).await?;
        let values = parse_all(tag, &items)?;
        Ok(HostValue::Sequence(
            values.into_iter().map(HostValue::Scalar).collect(),
        ))
    }

    async fn mapping(&mut self, name: &str) -> Result<HostValue, DecodeError> {
        let text = self.stream(&protocol::print_pairs(name)).await?;
        let pairs = parse::pair_list(&text)?;
        if pairs.is_empty() {
            return Ok(HostValue::Mapping(Vec::new()));
        }
        let key_tag = self.element_tag("mapping", &protocol::key_of(name)).await?;
        let value_tag = self.element_tag("mapping", &protocol::mapped_of(name)).await?;
        let entries = pairs
            .iter()
            .map(|(k, v)| Ok((parse::scalar(key_tag, k)?, parse::scalar(value_tag, v)?)))
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(HostValue::Mapping(entries))
    }

    async fn nd_array(&mut self, name: &str) -> Result<HostValue, DecodeError> {
        let items = self.elements(name).await?;
        let shape = self.shape(name).await?;
        let tag = self.element_tag("array", &protocol::element_of(name)).await?;
        let data = parse_all(tag, &items)?;
        let array = NdArray::new(shape, tag.kind(), data);
        if array.element_count() != array.data.len() {
            return Err(DecodeError::ShapeMismatch {
                shape: array.shape,
                found: array.data.len(),
            });
        }
        Ok(HostValue::NdArray(array))
    }

    async fn table(&mut self, name: &str) -> Result<HostValue, DecodeError> {
        let data_expr = protocol::table_data(name);
        let items = self.elements(&data_expr).await?;
        let shape = self.shape(&data_expr).await?;
        let index_expr = protocol::axis_labels(name, TableAxis::Index);
        let column_expr = protocol::axis_labels(name, TableAxis::Columns);
        let index_items = self.elements(&index_expr).await?;
        let column_items = self.elements(&column_expr).await?;

        let tag = self.element_tag("table", &protocol::element_of(&data_expr)).await?;
        let index_tag = self.element_tag("table", &protocol::element_of(&index_expr)).await?;
        let column_tag = self.element_tag("table", &protocol::element_of(&column_expr)).await?;

        if shape != [index_items.len(), column_items.len()]
            || items.len() != index_items.len() * column_items.len()
        {
            return Err(DecodeError::ShapeMismatch {
                shape,
                found: items.len(),
            });
        }
        Ok(HostValue::Table(Table {
            index: parse_all(index_tag, &index_items)?,
            columns: parse_all(column_tag, &column_items)?,
            dtype: tag.kind(),
            data: parse_all(tag, &items)?,
        }))
    }

    // ── Engine round trips ──

    /// Raw type tag of `expr` plus its decoding family, if supported.
    async fn runtime_type(
        &mut self,
        expr: &str,
    ) -> Result<(String, Option<RuntimeType>), DecodeError> {
        let text = request_text(
            &mut *self.transport,
            &protocol::type_query(expr),
            ResponseKind::ExecuteResult,
            self.retry,
        )
        .await?;
        let tag = normalize_tag(&text);
        let runtime = RuntimeType::from_tag(&tag);
        Ok((tag, runtime))
    }

    async fn element_tag(
        &mut self,
        container: &'static str,
        expr: &str,
    ) -> Result<ScalarTag, DecodeError> {
        match self.runtime_type(expr).await? {
            (_, Some(RuntimeType::Scalar(tag))) => Ok(tag),
            (tag, _) => Err(DecodeError::UnsupportedElement { container, tag }),
        }
    }

    /// Printed output of `statement` without its terminating newline.
    async fn stream(&mut self, statement: &str) -> Result<String, DecodeError> {
        let mut text =
            request_text(&mut *self.transport, statement, ResponseKind::Stream, self.retry).await?;
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    async fn elements(&mut self, expr: &str) -> Result<Vec<String>, DecodeError> {
        let text = self.stream(&protocol::print_elements(expr)).await?;
        Ok(parse::flat_list(&text)?)
    }

    async fn shape(&mut self, expr: &str) -> Result<Vec<usize>, DecodeError> {
        let text = self.stream(&protocol::print_shape(expr)).await?;
        Ok(parse::shape(&text)?)
    }
}

/// Decode one engine variable with a throwaway [`Decoder`].
pub async fn decode<T: Transport + ?Sized>(
    transport: &mut T,
    name: &str,
    retry: &RetryPolicy,
) -> Result<HostValue, DecodeError> {
    Decoder::new(transport, retry).decode(name).await
}

fn parse_all(tag: ScalarTag, items: &[String]) -> Result<Vec<Scalar>, ParseError> {
    items.iter().map(|s| parse::scalar(tag, s)).collect()
}
