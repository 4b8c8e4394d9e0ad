use super::domain::Invoice;
use crate::workflows::money::format_cents;
use crate::workflows::vouchers::VoucherTransaction;

const HEADER: [&str; 6] = [
    "invoice_number",
    "reference_number",
    "processed_at",
    "voucher_code",
    "products",
    "amount",
];

/// One CSV row per transaction, followed by a total row.
pub fn invoice_csv(
    invoice: &Invoice,
    transactions: &[VoucherTransaction],
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for transaction in transactions {
        writer.write_record([
            invoice.number.as_str(),
            transaction.reference_number.as_str(),
            &transaction.processed_at.format("%Y-%m-%d %H:%M").to_string(),
            transaction.voucher_code.0.as_str(),
            &transaction.products.join("; "),
            &format_cents(transaction.amount_cents),
        ])?;
    }
    writer.write_record([
        invoice.number.as_str(),
        "",
        "",
        "",
        "TOTAL",
        &format_cents(invoice.total_cents),
    ])?;
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}
