//! Name-based access into one decoded row.

use crate::wire::Column;
use crate::Value;

#[derive(Debug)]
pub struct RowRef<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [Column], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_i64()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::RowRef;
    use crate::wire::Column;
    use crate::Value;

    fn columns() -> Vec<Column> {
        vec![
            Column {
                name: "id".to_owned(),
                data_type: "bigint".to_owned(),
                type_signature: None,
            },
            Column {
                name: "name".to_owned(),
                data_type: "varchar".to_owned(),
                type_signature: None,
            },
        ]
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let columns = columns();
        let values = vec![Value::BigInt(7), Value::from("kit")];
        let row = RowRef::new(&columns, &values);
        assert_eq!(row.get_i64("ID"), Some(7));
        assert_eq!(row.get_str("name"), Some("kit"));
        assert_eq!(row.get("missing"), None);
    }
}
