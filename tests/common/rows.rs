//! Staging row builders with realistic legacy values.

use velt_migration::staging::{
    ActiveMemberRow, AddressMemberRow, FileMakerMemberRow, GiftRow, MandateRow, PersonRow,
};

pub fn address_member(lidmaatschap_id: i64) -> AddressMemberRow {
    AddressMemberRow {
        lidmaatschap_id,
        street_name: Some("Kerkstraat".to_string()),
        street_number: Some("12".to_string()),
        street_number_suffix: Some("B".to_string()),
        postal_code: Some("9000".to_string()),
        city: Some("Gent".to_string()),
        country_iso: Some("BE".to_string()),
        membership_end_date: None,
        afdeling_id: Some(14),
        iban: None,
        bic: None,
    }
}

pub fn person(id: i64, lidmaatschap_id: i64, first: &str, last: &str) -> PersonRow {
    PersonRow {
        id,
        lidmaatschap_id,
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        gender: Some("V".to_string()),
        birth_date: Some("1964-05-17".to_string()),
        email: Some(format!("{}@velt_migratie_2018.be", first.to_lowercase())),
        phone: None,
        fax: None,
    }
}

pub fn filemaker_member(lidnummer: &str, achternaam: &str) -> FileMakerMemberRow {
    FileMakerMemberRow {
        lidnummer: lidnummer.to_string(),
        is_organisatie: Some(0),
        voornaam: Some("Mieke".to_string()),
        achternaam: Some(achternaam.to_string()),
        straat: Some("Stationsstraat".to_string()),
        huisnummer: Some("4".to_string()),
        postcode: Some("3000".to_string()),
        gemeente: Some("Leuven".to_string()),
        begindatum: Some("2001-03-01".to_string()),
        einddatum: Some("2017-12-31".to_string()),
        ..Default::default()
    }
}

pub fn active_member(lidnummer: &str, einddatum: &str) -> ActiveMemberRow {
    ActiveMemberRow {
        lidnummer: lidnummer.to_string(),
        begindatum: None,
        einddatum: Some(einddatum.to_string()),
    }
}

pub fn mandate(lidnummer: &str) -> MandateRow {
    MandateRow {
        lidnummer: lidnummer.to_string(),
        iban: Some("BE68 5390 0754 7034".to_string()),
        bic: Some("GKCCBEBB".to_string()),
        referentie: Some(format!("VELT-{lidnummer}")),
        datum_mandaat: Some("2016-03-04".to_string()),
        ingangsdatum: Some("2016-04-01".to_string()),
        bedrag: Some(24.0),
    }
}

pub fn gift(id: i64, lidnummer: &str, bedrag: f64) -> GiftRow {
    GiftRow {
        id,
        lidnummer: lidnummer.to_string(),
        bedrag: Some(bedrag),
        datum: Some("2017-11-20".to_string()),
        voornaam: Some("Jef".to_string()),
        achternaam: Some("Wouters".to_string()),
        omschrijving: Some("Gift via overschrijving".to_string()),
    }
}
