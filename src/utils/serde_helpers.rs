//! ObjectIds são gravados como ObjectId no MongoDB mas expostos como string
//! hex no JSON. O serializer BSON não é "human readable", o serde_json é.

use mongodb::bson::oid::ObjectId;
use serde::Serializer;

pub fn object_id_as_hex<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&id.to_hex())
    } else {
        serde::Serialize::serialize(id, serializer)
    }
}

pub fn option_object_id_as_hex<S>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(id) => object_id_as_hex(id, serializer),
        None => serializer.serialize_none(),
    }
}

pub fn object_ids_as_hex<S>(ids: &[ObjectId], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeSeq;

    if serializer.is_human_readable() {
        let mut seq = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&id.to_hex())?;
        }
        seq.end()
    } else {
        serde::Serialize::serialize(ids, serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, Bson};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        #[serde(serialize_with = "object_id_as_hex")]
        id: ObjectId,
        #[serde(serialize_with = "option_object_id_as_hex")]
        parent: Option<ObjectId>,
        #[serde(serialize_with = "object_ids_as_hex")]
        children: Vec<ObjectId>,
    }

    #[test]
    fn json_gets_hex_strings() {
        let id = ObjectId::new();
        let sample = Sample { id, parent: None, children: vec![id] };
        let value = serde_json::to_value(&sample).unwrap();

        assert_eq!(value["id"], id.to_hex());
        assert!(value["parent"].is_null());
        assert_eq!(value["children"][0], id.to_hex());
    }

    #[test]
    fn bson_keeps_object_ids() {
        let id = ObjectId::new();
        let sample = Sample { id, parent: Some(id), children: vec![id] };
        // mesmo caminho usado pelo driver ao inserir
        let raw = bson::to_raw_document_buf(&sample).unwrap();
        let document = raw.to_document().unwrap();

        assert_eq!(document.get("id"), Some(&Bson::ObjectId(id)));
        assert_eq!(document.get("parent"), Some(&Bson::ObjectId(id)));
        assert_eq!(document.get_array("children").unwrap()[0], Bson::ObjectId(id));
    }
}
